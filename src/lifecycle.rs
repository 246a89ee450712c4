//! Load lifecycle shared by every view that fetches asynchronously.
//!
//! A load captures an [`ActiveFlag`] when it starts. Tearing the view down
//! (or starting a newer load) flips the flag, and whatever the stale load
//! produces afterwards is discarded instead of applied. Requests themselves
//! are never aborted.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ActiveFlag(Arc<AtomicBool>);

impl ActiveFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn deactivate(&self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Default for ActiveFlag {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadState<T> {
    Idle,
    Loading,
    Ready(T),
    Error(String),
}

/// Holds the state of one view's load and the flag of the load in flight.
#[derive(Debug)]
pub struct Loader<T> {
    state: LoadState<T>,
    current: Option<ActiveFlag>,
}

impl<T> Default for Loader<T> {
    fn default() -> Self {
        Self {
            state: LoadState::Idle,
            current: None,
        }
    }
}

impl<T> Loader<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &LoadState<T> {
        &self.state
    }

    pub fn into_state(self) -> LoadState<T> {
        self.state
    }

    /// Start a load. Any load still in flight is superseded.
    pub fn begin(&mut self) -> ActiveFlag {
        if let Some(previous) = self.current.take() {
            previous.deactivate();
        }
        let flag = ActiveFlag::new();
        self.current = Some(flag.clone());
        self.state = LoadState::Loading;
        flag
    }

    /// Apply a finished load. Returns `false` when the load was superseded
    /// or torn down, in which case the result is dropped.
    pub fn finish<E: std::fmt::Display>(
        &mut self,
        flag: &ActiveFlag,
        result: std::result::Result<T, E>,
    ) -> bool {
        if !flag.is_active() {
            tracing::debug!("discarding result of inactive load");
            return false;
        }
        self.state = match result {
            Ok(value) => LoadState::Ready(value),
            Err(err) => LoadState::Error(err.to_string()),
        };
        self.current = None;
        true
    }

    /// Stop caring about the load in flight. The last applied state stays.
    pub fn teardown(&mut self) {
        if let Some(flag) = self.current.take() {
            flag.deactivate();
        }
    }
}
