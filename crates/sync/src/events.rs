//! Presentation adapter seam.
//!
//! Engines never render anything; after every state change they call
//! [`EngineEvents::refresh`] so the presentation layer can re-read the
//! collection, and user-facing outcomes go through [`EngineEvents::notify`].

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A user-facing notification emitted by an engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Something worked ("Item added to cart!").
    Success(String),
    /// Something actionable failed (validation, limit, failed save).
    Error(String),
}

/// Callbacks the presentation adapter wires into the engines.
pub trait EngineEvents: Send + Sync {
    /// The collection changed; re-render badges, pages, buttons.
    fn refresh(&self);

    /// Show a toast/banner to the user.
    fn notify(&self, notice: Notice);
}

/// An events sink that does nothing. Useful for headless use and tests that
/// only assert on engine state.
#[derive(Debug, Default)]
pub struct NoopEvents;

impl EngineEvents for NoopEvents {
    fn refresh(&self) {}
    fn notify(&self, _notice: Notice) {}
}

/// An events sink that records everything, for asserting on the calling
/// contract in tests.
#[derive(Debug, Default)]
pub struct RecordingEvents {
    refreshes: AtomicUsize,
    notices: Mutex<Vec<Notice>>,
}

impl RecordingEvents {
    /// Create an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of refresh callbacks so far.
    #[must_use]
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Snapshot of the notices emitted so far.
    ///
    /// # Panics
    ///
    /// Panics if a previous holder of the lock panicked.
    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().expect("notices lock").clone()
    }
}

impl EngineEvents for RecordingEvents {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }

    fn notify(&self, notice: Notice) {
        self.notices.lock().expect("notices lock").push(notice);
    }
}
