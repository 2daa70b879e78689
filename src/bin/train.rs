use std::process;

use topics::apps::run_train;
use topics::store::FsArtifactStore;

fn main() {
    let result = run_train(std::env::args().skip(1), |output| {
        Ok(FsArtifactStore::new(output))
    });
    if let Err(err) = result {
        eprintln!("train failed: {err}");
        process::exit(1);
    }
}
