use std::error::Error;
use std::process;

use topics::apps::{SourceLocations, run_pipeline};
use topics::store::FsArtifactStore;
use topics::warehouse::{CsvRecordSource, CsvResultSink};

fn build_source(locations: &SourceLocations) -> Result<CsvRecordSource, Box<dyn Error>> {
    let vocabulary = locations
        .vocabulary_csv
        .clone()
        .ok_or("--vocabulary-csv is required for the file-backed source")?;
    let dataset = locations
        .dataset_csv
        .clone()
        .ok_or("--dataset-csv is required for the file-backed source")?;
    Ok(CsvRecordSource::new(vocabulary, dataset))
}

fn main() {
    let result = run_pipeline(
        std::env::args().skip(1),
        |output| Ok(FsArtifactStore::new(output)),
        build_source,
        |sink_dir| Ok(CsvResultSink::new(sink_dir)),
    );
    if let Err(err) = result {
        eprintln!("pipeline failed: {err}");
        process::exit(1);
    }
}
