//! Instrumentation engines drive the actual measurement.
//!
//! A session only configures and drives an engine through
//! [`InstrumentationEngine`]. [`RecordingEngine`] is the in-process engine
//! shipped with the crate: instrumented code (or a hook integration)
//! reports executed lines through a cloneable [`HitRecorder`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::warn;

use crate::report::CoverageResult;
use crate::scope::InclusionScope;
use crate::{Error, Result};

/// The measurement backend of a session.
pub trait InstrumentationEngine {
    /// Begins collecting coverage for the files in `scope`.
    fn start(&mut self, session_id: &str, scope: &InclusionScope) -> Result<()>;

    /// Ends collection and returns everything measured since `start`.
    fn stop(&mut self) -> Result<CoverageResult>;
}

impl<E: InstrumentationEngine + ?Sized> InstrumentationEngine for Box<E> {
    fn start(&mut self, session_id: &str, scope: &InclusionScope) -> Result<()> {
        (**self).start(session_id, scope)
    }

    fn stop(&mut self) -> Result<CoverageResult> {
        (**self).stop()
    }
}

#[derive(Debug)]
struct ActiveRun {
    session_id: String,
    scope: InclusionScope,
    hits: BTreeMap<PathBuf, BTreeMap<u32, u32>>,
}

type Shared = Arc<Mutex<Option<ActiveRun>>>;

fn lock(shared: &Shared) -> Result<MutexGuard<'_, Option<ActiveRun>>> {
    shared
        .lock()
        .map_err(|_| Error::Engine("recorder state poisoned".to_string()))
}

/// Engine that accumulates hits reported through [`HitRecorder`] handles.
#[derive(Debug, Default)]
pub struct RecordingEngine {
    shared: Shared,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// A handle for reporting executed lines. Handles stay valid for the life
    /// of the engine; hits outside an active run are ignored.
    pub fn recorder(&self) -> HitRecorder {
        HitRecorder {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl InstrumentationEngine for RecordingEngine {
    fn start(&mut self, session_id: &str, scope: &InclusionScope) -> Result<()> {
        let mut state = lock(&self.shared)?;
        if state.is_some() {
            return Err(Error::Engine("measurement already running".to_string()));
        }
        *state = Some(ActiveRun {
            session_id: session_id.to_string(),
            scope: scope.clone(),
            hits: BTreeMap::new(),
        });
        Ok(())
    }

    fn stop(&mut self) -> Result<CoverageResult> {
        let run = lock(&self.shared)?
            .take()
            .ok_or_else(|| Error::Engine("no measurement is running".to_string()))?;

        let mut builder = CoverageResult::builder().session_id(&run.session_id);
        let mut hits = Vec::new();
        // Every in-scope file gets a table entry so unexecuted files show up.
        for (file_id, path) in run.scope.files().enumerate() {
            if path.to_str().is_none() {
                warn!(
                    path = %path.display(),
                    "Source path is not valid UTF-8, storing a lossy copy"
                );
            }
            builder = builder.add_file(&path.to_string_lossy());
            if let Some(lines) = run.hits.get(path) {
                hits.extend(lines.iter().map(|(&line, &count)| (file_id as u32, line, count)));
            }
        }
        for (file_id, line, count) in hits {
            builder = builder.add_hit(file_id, line, count);
        }
        builder.build()
    }
}

/// Cloneable, thread-safe handle feeding a [`RecordingEngine`].
#[derive(Debug, Clone)]
pub struct HitRecorder {
    shared: Shared,
}

impl HitRecorder {
    /// Records one execution of `line` (1-based) in `path`.
    ///
    /// Returns `false` when nothing was recorded: no run is active, the file is
    /// outside the scope, or `line` is 0.
    pub fn hit<P: AsRef<Path>>(&self, path: P, line: u32) -> bool {
        if line == 0 {
            return false;
        }
        let Ok(mut state) = self.shared.lock() else {
            return false;
        };
        let Some(run) = state.as_mut() else {
            return false;
        };

        let Some(key) = run.scope.member(path.as_ref()) else {
            return false;
        };

        let count = run.hits.entry(key).or_default().entry(line).or_insert(0);
        *count = count.saturating_add(1);
        true
    }

    /// True while the engine is between `start` and `stop`.
    pub fn is_recording(&self) -> bool {
        self.shared.lock().map(|s| s.is_some()).unwrap_or(false)
    }
}
