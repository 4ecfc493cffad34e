use covsession::{CoverageSession, RecordingEngine};
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    // measure this crate's own sources
    let engine = RecordingEngine::new();
    let recorder = engine.recorder();
    let session = CoverageSession::builder()
        .include(concat!(env!("CARGO_MANIFEST_DIR"), "/demos"))
        .extensions(["rs"])
        .report_dir("/tmp/covsession-demo")
        .engine(engine)
        .start()?;

    let this_file = concat!(env!("CARGO_MANIFEST_DIR"), "/demos/session_demo.rs");
    recorder.hit(this_file, line!());
    recorder.hit(this_file, line!());

    // persisted explicitly here; dropping `session` would do the same
    let Some(path) = session.finish() else {
        return Err("coverage report was not saved".into());
    };

    let result = covsession::from_file(&path)?;
    println!(
        "Saved {} with {} files and {} covered lines",
        path.display(),
        result.files.len(),
        result.lines.len()
    );

    Ok(())
}
