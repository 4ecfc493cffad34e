//! One coverage-collection run per process.

use std::env;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::engine::{InstrumentationEngine, RecordingEngine};
use crate::report::{CovSerializer, CoverageResult, ReportSerializer, REPORT_EXTENSION};
use crate::scope::{InclusionScope, SourceResolver};
use crate::token::generate_token;
use crate::{Error, Result};

/// Report directory used when none is configured: `<tmp>/covsession/reports`.
pub fn default_report_dir() -> PathBuf {
    env::temp_dir().join("covsession").join("reports")
}

/// The command line of the current process, used as the session id.
///
/// This is the CLI counterpart of a request path. Falls back to `"unknown"`
/// when no arguments are visible.
pub fn invocation_id() -> String {
    let args: Vec<String> = env::args_os()
        .map(|a| a.to_string_lossy().into_owned())
        .collect();
    if args.is_empty() {
        "unknown".to_string()
    } else {
        args.join(" ")
    }
}

fn sanitize_session_id(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

/// Creates `dir` and its parents unless it already exists.
///
/// Losing a creation race to another process is fine as long as the
/// directory exists afterwards.
fn ensure_report_dir(dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(_) if dir.is_dir() => Ok(()),
        Err(source) => Err(Error::DirectoryCreation {
            path: dir.to_path_buf(),
            source,
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Open,
    Closed,
}

/// Configures and starts a [`CoverageSession`].
pub struct SessionBuilder {
    include: Vec<PathBuf>,
    resolver: SourceResolver,
    report_dir: Option<PathBuf>,
    session_id: Option<String>,
    engine: Option<Box<dyn InstrumentationEngine>>,
    serializer: Option<Box<dyn ReportSerializer>>,
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionBuilder {
    pub fn new() -> Self {
        Self {
            include: Vec::new(),
            resolver: SourceResolver::new(),
            report_dir: None,
            session_id: None,
            engine: None,
            serializer: None,
        }
    }

    /// Adds a file or directory to the inclusion scope.
    pub fn include<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.include.push(path.into());
        self
    }

    pub fn include_all<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.include.extend(paths.into_iter().map(Into::into));
        self
    }

    /// Restricts directory expansion to files with these extensions.
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resolver = SourceResolver::with_extensions(extensions);
        self
    }

    /// Directory for the report artifact. Defaults to [`default_report_dir`].
    pub fn report_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.report_dir = Some(dir.into());
        self
    }

    /// Tag for the run. Defaults to [`invocation_id`].
    pub fn session_id(mut self, id: &str) -> Self {
        self.session_id = Some(id.to_string());
        self
    }

    /// Measurement backend. Defaults to a fresh [`RecordingEngine`].
    pub fn engine<E: InstrumentationEngine + 'static>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Artifact writer. Defaults to [`CovSerializer`].
    pub fn serializer<S: ReportSerializer + 'static>(mut self, serializer: S) -> Self {
        self.serializer = Some(Box::new(serializer));
        self
    }

    /// Prepares the report directory, resolves the scope and starts the
    /// engine.
    ///
    /// # Errors
    /// `DirectoryCreation` if the report directory cannot be created, or the
    /// engine's error if it fails to start. No session exists in either case.
    pub fn start(self) -> Result<CoverageSession> {
        let report_dir = self.report_dir.unwrap_or_else(default_report_dir);
        ensure_report_dir(&report_dir)?;

        let scope = InclusionScope::resolve_with(&self.include, &self.resolver);
        let session_id = sanitize_session_id(&self.session_id.unwrap_or_else(invocation_id));

        let mut engine: Box<dyn InstrumentationEngine> = match self.engine {
            Some(engine) => engine,
            None => Box::new(RecordingEngine::new()),
        };
        engine.start(&session_id, &scope)?;

        info!(
            session = %session_id,
            files = scope.len(),
            report_dir = %report_dir.display(),
            "Coverage collection started"
        );

        let serializer: Box<dyn ReportSerializer> = match self.serializer {
            Some(serializer) => serializer,
            None => Box::new(CovSerializer),
        };

        Ok(CoverageSession {
            scope,
            session_id,
            report_dir,
            engine,
            serializer,
            state: SessionState::Open,
        })
    }
}

/// A running coverage collection that persists at most one report.
///
/// Dropping an open session persists it, so holding the session for the
/// lifetime of `main` (or a test) covers normal returns and panics that
/// unwind. `std::process::exit`, aborts and kills skip the finalizer.
pub struct CoverageSession {
    scope: InclusionScope,
    session_id: String,
    report_dir: PathBuf,
    engine: Box<dyn InstrumentationEngine>,
    serializer: Box<dyn ReportSerializer>,
    state: SessionState,
}

impl CoverageSession {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Starts a session with the default engine and serializer.
    pub fn new<P: AsRef<Path>>(paths: &[P], report_dir: Option<PathBuf>) -> Result<Self> {
        let mut builder = SessionBuilder::new()
            .include_all(paths.iter().map(|p| p.as_ref().to_path_buf()));
        if let Some(dir) = report_dir {
            builder = builder.report_dir(dir);
        }
        builder.start()
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn scope(&self) -> &InclusionScope {
        &self.scope
    }

    pub fn is_open(&self) -> bool {
        self.state == SessionState::Open
    }

    /// Stops measurement and writes `<report_dir>/<token>.cov`.
    ///
    /// The session is closed before anything can fail, so a failed attempt is
    /// never retried by the finalizer.
    pub fn try_persist(&mut self) -> Result<PathBuf> {
        if self.state == SessionState::Closed {
            return Err(Error::SessionClosed);
        }
        self.state = SessionState::Closed;

        let result = self.engine.stop()?;
        let token = generate_token()?;
        let path = self
            .report_dir
            .join(format!("{token}.{REPORT_EXTENSION}"));

        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        if let Err(err) = self.write_report(file, &result) {
            if let Err(cleanup) = fs::remove_file(&path) {
                warn!(
                    path = %path.display(),
                    error = %cleanup,
                    "Failed to remove partial report"
                );
            }
            return Err(err);
        }

        info!(
            session = %self.session_id,
            path = %path.display(),
            files = result.files.len(),
            lines = result.lines.len(),
            "Coverage report saved"
        );
        Ok(path)
    }

    fn write_report(&self, file: File, result: &CoverageResult) -> Result<()> {
        let mut writer = BufWriter::new(file);
        self.serializer.serialize(result, &mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Best-effort persist: failures are logged and swallowed.
    ///
    /// Returns the artifact path on success.
    pub fn persist(&mut self) -> Option<PathBuf> {
        match self.try_persist() {
            Ok(path) => Some(path),
            Err(err) => {
                error!(
                    session = %self.session_id,
                    error = %err,
                    "Code coverage save failed: {err}"
                );
                None
            }
        }
    }

    /// Consumes the session and persists it.
    pub fn finish(mut self) -> Option<PathBuf> {
        self.persist()
    }
}

impl Drop for CoverageSession {
    fn drop(&mut self) {
        if self.is_open() {
            self.persist();
        }
    }
}

impl std::fmt::Debug for CoverageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageSession")
            .field("session_id", &self.session_id)
            .field("report_dir", &self.report_dir)
            .field("files", &self.scope.len())
            .field("state", &self.state)
            .finish()
    }
}
