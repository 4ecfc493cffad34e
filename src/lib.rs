//! # covsession
//!
//! Runs one coverage-collection session per process and persists its result as
//! a uniquely named `.cov` artifact.
//!
//! Measurement itself belongs to an [`InstrumentationEngine`]; this crate
//! resolves which files are in scope, drives the engine, and writes the result
//! when the session ends. Failing to create the report directory is an error
//! for the caller. Failing to save the report never is: it is logged through
//! `tracing` and the host carries on.
//!
//! ## Example Usage
//!
//! ```no_run
//! use covsession::{CoverageSession, RecordingEngine};
//!
//! let engine = RecordingEngine::new();
//! let recorder = engine.recorder();
//!
//! let session = CoverageSession::builder()
//!     .include("src")
//!     .extensions(["rs"])
//!     .report_dir("target/coverage")
//!     .engine(engine)
//!     .start()
//!     .unwrap();
//!
//! recorder.hit("src/main.rs", 12);
//!
//! // Persisted here, or when `session` is dropped.
//! if let Some(path) = session.finish() {
//!     let result = covsession::from_file(path).unwrap();
//!     println!("{} lines covered", result.lines.len());
//! }
//! ```

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub mod engine;
pub mod report;
pub mod scope;
pub mod session;
pub mod token;

pub use engine::{HitRecorder, InstrumentationEngine, RecordingEngine};
pub use report::{
    find_reports, from_file, from_reader, is_report_file_name, to_file, to_writer,
    CovSerializer, CoverageResult, CoverageResultBuilder, FileEntry, LineHit, ReportHeader,
    ReportSerializer, REPORT_EXTENSION,
};
pub use scope::{InclusionScope, SourceResolver};
pub use session::{default_report_dir, invocation_id, CoverageSession, SessionBuilder};
pub use token::generate_token;

/// A specialized `Result` type for covsession operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while running a session or reading and writing reports.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred while reading or writing.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// The report directory is missing and could not be created.
    #[error("Directory \"{}\" was not created: {source}", .path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    /// The instrumentation engine failed to start or stop.
    #[error("Instrumentation engine error: {0}")]
    Engine(String),
    /// The session has already been persisted.
    #[error("Coverage session is already closed")]
    SessionClosed,
    /// The random source could not produce a report token.
    #[error("Failed to generate report token: {0}")]
    Token(#[from] rand::Error),
    /// The report format is invalid or malformed.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// The report version is not supported.
    #[error("Unsupported report version: {0}")]
    UnsupportedVersion(u32),
    /// The file table is invalid or malformed.
    #[error("Invalid file table: {0}")]
    InvalidFileTable(String),
    /// The line table is invalid, malformed or truncated.
    #[error("Invalid line table: {0}")]
    InvalidLineTable(String),
    /// The data failed a validation check (e.g., inconsistent IDs).
    #[error("Validation error: {0}")]
    ValidationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::NotFound, "file not found"));
        assert!(io_err.to_string().contains("I/O error"));

        let dir_err = Error::DirectoryCreation {
            path: PathBuf::from("/ro/reports"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert_eq!(
            dir_err.to_string(),
            "Directory \"/ro/reports\" was not created: denied"
        );

        let version_err = Error::UnsupportedVersion(3);
        assert_eq!(version_err.to_string(), "Unsupported report version: 3");
    }

    #[test]
    fn test_error_source() {
        use std::error::Error as _;

        let dir_err = Error::DirectoryCreation {
            path: PathBuf::from("/ro"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(dir_err.source().is_some());
        assert!(Error::SessionClosed.source().is_none());
    }
}
