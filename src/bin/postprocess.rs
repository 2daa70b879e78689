use std::process;

use topics::apps::run_postprocess;
use topics::store::FsArtifactStore;
use topics::warehouse::CsvResultSink;

fn main() {
    let result = run_postprocess(
        std::env::args().skip(1),
        |output| Ok(FsArtifactStore::new(output)),
        |sink_dir| Ok(CsvResultSink::new(sink_dir)),
    );
    if let Err(err) = result {
        eprintln!("postprocess failed: {err}");
        process::exit(1);
    }
}
