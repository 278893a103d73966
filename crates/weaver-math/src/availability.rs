//! Typesetting library availability for one editing session.
//!
//! The state only ever moves forward:
//! `NotRequested → Loading → Loaded | Failed`. There is exactly one load
//! attempt per session and a failed load is never retried.
//!
//! Subscribers are notified synchronously, in subscription order, once per
//! transition. No `RefCell` borrow is held while they run, so a subscriber
//! may freely read the availability (or render) from inside its callback.

use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::engine::TypesetEngine;

/// Lifecycle stage of the typesetting library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AvailabilityState {
    NotRequested,
    Loading,
    Loaded,
    Failed,
}

impl AvailabilityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityState::NotRequested => "NotRequested",
            AvailabilityState::Loading => "Loading",
            AvailabilityState::Loaded => "Loaded",
            AvailabilityState::Failed => "Failed",
        }
    }

    /// `Loaded` and `Failed` are never left.
    pub fn is_terminal(&self) -> bool {
        matches!(self, AvailabilityState::Loaded | AvailabilityState::Failed)
    }
}

impl fmt::Display for AvailabilityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the library could not be loaded.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The loader reported a failure (network error, timeout, bad script).
    #[error("typesetting library failed to load: {0}")]
    Failed(String),
    /// The loader dropped its completion without resolving it.
    #[error("typesetting library load was abandoned")]
    Abandoned,
}

/// Shared engine handle.
pub type EngineHandle = Rc<dyn TypesetEngine>;

enum LoadState {
    NotRequested,
    Loading,
    Loaded(EngineHandle),
    Failed(LoadError),
}

impl LoadState {
    fn kind(&self) -> AvailabilityState {
        match self {
            LoadState::NotRequested => AvailabilityState::NotRequested,
            LoadState::Loading => AvailabilityState::Loading,
            LoadState::Loaded(_) => AvailabilityState::Loaded,
            LoadState::Failed(_) => AvailabilityState::Failed,
        }
    }
}

type Callback = Rc<dyn Fn(AvailabilityState)>;

struct Inner {
    state: LoadState,
    subscribers: Vec<(u64, Callback)>,
    next_subscriber: u64,
}

/// Availability of the typesetting library, shared by everything in a session.
///
/// Cloning yields another handle to the same state.
#[derive(Clone)]
pub struct Availability {
    inner: Rc<RefCell<Inner>>,
}

impl Default for Availability {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.borrow();
        f.debug_struct("Availability")
            .field("state", &inner.state.kind())
            .field("subscribers", &inner.subscribers.len())
            .finish()
    }
}

impl Availability {
    /// A fresh availability in `NotRequested`.
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Inner {
                state: LoadState::NotRequested,
                subscribers: Vec::new(),
                next_subscriber: 0,
            })),
        }
    }

    pub fn state(&self) -> AvailabilityState {
        self.inner.borrow().state.kind()
    }

    /// The engine, once loaded.
    pub fn engine(&self) -> Option<EngineHandle> {
        match &self.inner.borrow().state {
            LoadState::Loaded(engine) => Some(engine.clone()),
            _ => None,
        }
    }

    /// The load error, once failed.
    pub fn load_error(&self) -> Option<LoadError> {
        match &self.inner.borrow().state {
            LoadState::Failed(err) => Some(err.clone()),
            _ => None,
        }
    }

    /// Start the one load attempt of this session.
    ///
    /// Does nothing unless the state is `NotRequested`. The loader receives a
    /// [`LoadCompletion`] and may resolve it immediately or later.
    pub fn request_load(&self, loader: &dyn EngineLoader) {
        if !self.transition(LoadState::Loading, |from| {
            from == AvailabilityState::NotRequested
        }) {
            tracing::trace!(
                target: "weaver::math::availability",
                state = %self.state(),
                "load already requested"
            );
            return;
        }

        loader.load(LoadCompletion {
            target: Some(Rc::downgrade(&self.inner)),
        });
    }

    /// Register `callback` for every future transition.
    ///
    /// If the state is already terminal, `callback` is called once right away
    /// with it and nothing is registered.
    pub fn subscribe(&self, callback: impl Fn(AvailabilityState) + 'static) -> Subscription {
        let current = self.state();
        if current.is_terminal() {
            callback(current);
            return Subscription { slot: None };
        }

        let mut inner = self.inner.borrow_mut();
        let id = inner.next_subscriber;
        inner.next_subscriber += 1;
        inner.subscribers.push((id, Rc::new(callback)));
        Subscription {
            slot: Some((Rc::downgrade(&self.inner), id)),
        }
    }

    /// Commit `next` if `allowed(current)` and notify subscribers.
    fn transition(&self, next: LoadState, allowed: impl Fn(AvailabilityState) -> bool) -> bool {
        Self::transition_inner(&self.inner, next, allowed)
    }

    fn transition_inner(
        inner: &Rc<RefCell<Inner>>,
        next: LoadState,
        allowed: impl Fn(AvailabilityState) -> bool,
    ) -> bool {
        let (to, subscribers) = {
            let mut guard = inner.borrow_mut();
            let from = guard.state.kind();
            if !allowed(from) {
                return false;
            }
            let to = next.kind();
            guard.state = next;
            tracing::debug!(
                target: "weaver::math::availability",
                %from,
                %to,
                subscribers = guard.subscribers.len(),
                "availability transition"
            );
            let subscribers: Vec<Callback> =
                guard.subscribers.iter().map(|(_, cb)| cb.clone()).collect();
            if to.is_terminal() {
                // Nothing can happen after a terminal state.
                guard.subscribers.clear();
            }
            (to, subscribers)
        };

        for callback in subscribers {
            callback(to);
        }
        true
    }
}

/// Guard for an availability subscription. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    slot: Option<(Weak<RefCell<Inner>>, u64)>,
}

impl Subscription {
    /// Remove the callback. Same as dropping the guard.
    pub fn unsubscribe(self) {}

    /// Whether the callback is still registered.
    pub fn is_active(&self) -> bool {
        let Some((inner, id)) = &self.slot else {
            return false;
        };
        inner
            .upgrade()
            .is_some_and(|inner| inner.borrow().subscribers.iter().any(|(i, _)| i == id))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some((inner, id)) = self.slot.take() else {
            return;
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if let Ok(mut inner) = inner.try_borrow_mut() {
            inner.subscribers.retain(|(i, _)| *i != id);
        }
    }
}

/// Something that can fetch the typesetting library.
pub trait EngineLoader {
    /// Begin loading. Must eventually resolve `completion`, or drop it (which
    /// counts as a failure).
    fn load(&self, completion: LoadCompletion);
}

/// One-shot handle resolving the pending load.
pub struct LoadCompletion {
    target: Option<Weak<RefCell<Inner>>>,
}

impl LoadCompletion {
    /// The library is ready.
    pub fn succeed(mut self, engine: EngineHandle) {
        self.finish(LoadState::Loaded(engine));
    }

    /// The library could not be loaded.
    pub fn fail(mut self, error: LoadError) {
        self.finish(LoadState::Failed(error));
    }

    /// Resolve with a loader result.
    pub fn complete(self, result: Result<EngineHandle, LoadError>) {
        match result {
            Ok(engine) => self.succeed(engine),
            Err(error) => self.fail(error),
        }
    }

    /// Await `load` and resolve with its output.
    pub async fn resolve<F>(self, load: F)
    where
        F: Future<Output = Result<EngineHandle, LoadError>>,
    {
        let result = load.await;
        self.complete(result);
    }

    fn finish(&mut self, state: LoadState) {
        let Some(target) = self.target.take() else {
            return;
        };
        // Session already gone: nothing to update.
        let Some(inner) = target.upgrade() else {
            return;
        };
        if let LoadState::Failed(err) = &state {
            tracing::warn!(
                target: "weaver::math::availability",
                error = %err,
                "math library load failed"
            );
        }
        Availability::transition_inner(&inner, state, |from| {
            from == AvailabilityState::Loading
        });
    }
}

impl Drop for LoadCompletion {
    fn drop(&mut self) {
        self.finish(LoadState::Failed(LoadError::Abandoned));
    }
}

/// Loader for an engine that is already present at session start.
///
/// Resolves synchronously, so the session goes straight through `Loading`
/// to `Loaded` inside [`Availability::request_load`].
#[derive(Clone)]
pub struct ReadyLoader(pub EngineHandle);

impl EngineLoader for ReadyLoader {
    fn load(&self, completion: LoadCompletion) {
        completion.succeed(self.0.clone());
    }
}

/// Loader for a session with no typesetting library at all.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableLoader;

impl EngineLoader for UnavailableLoader {
    fn load(&self, completion: LoadCompletion) {
        completion.fail(LoadError::Failed("no typesetting library configured".into()));
    }
}
