#![allow(dead_code)]

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use covsession::{CoverageResult, Error, InclusionScope, InstrumentationEngine, Result};
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
pub struct LogCapture {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().unwrap()).into_owned()
    }

    /// Runs `f` with a subscriber that writes into this capture.
    pub fn run<T>(&self, f: impl FnOnce() -> T) -> T {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::TRACE)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }
}

pub struct CaptureWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl Write for CaptureWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buf: Arc::clone(&self.buf),
        }
    }
}

/// Engine whose `stop` always fails with the given message.
pub struct FailingEngine {
    pub message: String,
}

impl FailingEngine {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

impl InstrumentationEngine for FailingEngine {
    fn start(&mut self, _session_id: &str, _scope: &InclusionScope) -> Result<()> {
        Ok(())
    }

    fn stop(&mut self) -> Result<CoverageResult> {
        Err(Error::Engine(self.message.clone()))
    }
}

/// Engine that only counts calls.
#[derive(Clone, Default)]
pub struct CountingEngine {
    pub starts: Arc<Mutex<u32>>,
    pub stops: Arc<Mutex<u32>>,
}

impl InstrumentationEngine for CountingEngine {
    fn start(&mut self, _session_id: &str, _scope: &InclusionScope) -> Result<()> {
        *self.starts.lock().unwrap() += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<CoverageResult> {
        *self.stops.lock().unwrap() += 1;
        Ok(CoverageResult::default())
    }
}

/// All entries directly inside `dir`.
pub fn dir_entries(dir: &Path) -> Vec<PathBuf> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    entries.sort();
    entries
}

pub fn file_name(path: &Path) -> String {
    path.file_name().unwrap().to_string_lossy().into_owned()
}

/// Engine that refuses to start.
pub struct RefusingEngine {
    pub message: String,
}

impl InstrumentationEngine for RefusingEngine {
    fn start(&mut self, _session_id: &str, _scope: &InclusionScope) -> Result<()> {
        Err(Error::Engine(self.message.clone()))
    }

    fn stop(&mut self) -> Result<CoverageResult> {
        Ok(CoverageResult::default())
    }
}
