// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readiness gates for immediate mode GUIs.
//!
//! Some values only show up after something outside of your control has
//! finished: a plugin registers itself, a script installs a global object,
//! a device appears. [`AsyncWaitFor`] checks a [`Condition`] once, right
//! away, and if it does not hold yet keeps checking it on a Tokio runtime
//! every `interval` until it does, or until an optional `timeout` elapses.
//! The UI observes the result with a cheap, non-blocking
//! [`is_ready()`](AsyncWaitFor::is_ready) call every frame.
//!
//! An [`AsyncViewport`] ties a GUI viewport to a wake-up callback so that a
//! gate becoming ready automatically triggers a repaint.
//!
//! ```no_run
//! use ::tokio_waitfor::condition::GlobalNamespace;
//! use ::tokio_waitfor::config::WaitForConfig;
//! use ::tokio_waitfor::{AsyncViewport, AsyncWaitFor};
//!
//! # let runtime = ::tokio::runtime::Builder::new_current_thread()
//! #     .enable_all()
//! #     .build()
//! #     .unwrap();
//! # let _guard = runtime.enter();
//! let namespace = GlobalNamespace::default();
//! let viewport = AsyncViewport::default();
//!
//! let mut gate: AsyncWaitFor =
//!     viewport.new_wait_for(namespace.clone(), "plugin", WaitForConfig::default());
//!
//! // Every frame:
//! viewport.woke_up();
//! if gate.update("plugin", WaitForConfig::default()) {
//!     // `plugin` is installed.
//! }
//! ```
//!
//! ## Feature flags
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]
//
// Clippy lints.
#![warn(clippy::pedantic)]
#![warn(clippy::cargo)]

use ::std::mem::replace;
use ::std::sync::atomic::{AtomicBool, Ordering};
use ::std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use ::tokio::runtime::Handle;
use ::tokio::task::JoinHandle;

/// Re-export `tokio` crate.
pub use ::tokio;

/// Conditions and the environment they are checked against.
pub mod condition;
/// Polling interval and timeout of a gate.
pub mod config;
/// Observing a gate's readiness from other places and tasks.
pub mod signal;
/// The readiness gate.
pub mod wait_for;

pub use condition::{Condition, Environment, GlobalNamespace};
pub use config::WaitForConfig;
pub use signal::{ReadySignal, WaitError};
pub use wait_for::AsyncWaitFor;

/// Represents a single GUI viewport (window) that can be woken up from
/// asynchronous tasks.
///
/// The wake-up callback **must not block**, because it is called from
/// inside the Tokio runtime when a gate becomes ready or stops polling.
///
/// Wake-ups are coalesced: after the first request, further requests are
/// dropped until [`woke_up()`](Self::woke_up) is called.
#[derive(Clone)]
pub struct AsyncViewport {
    wake_up_requested: Arc<AtomicBool>,
    wake_up: Arc<AsyncWakeUpSlot>,
}

/// A cloneable handle that can request a repaint of the [`AsyncViewport`]
/// it was created from.
///
/// Once the viewport is dropped, waking up does nothing.
#[derive(Clone)]
pub struct AsyncWaker {
    wake_up_requested: Arc<AtomicBool>,
    wake_up: Weak<AsyncWakeUpSlot>,
}

/// A set of [`AsyncWaker`]s that are all woken up together.
///
/// Used by [`ReadySignal`] so that every viewport observing the same gate
/// is repainted when it becomes ready.
#[derive(Clone, Default)]
pub struct AsyncWakerList {
    inner: Arc<RwLock<AsyncWakerSlots>>,
}

#[derive(Default)]
struct AsyncWakerSlots {
    slots: Vec<Option<AsyncWaker>>,
    vacant: Vec<usize>,
}

type AsyncWakeUpSlot = RwLock<Option<AsyncWakeUpCallback>>;
/// Wake-up callback of an [`AsyncViewport`]. Must not block.
pub type AsyncWakeUpCallback = Arc<dyn Fn() + Send + Sync>;

/// RAII guard that wakes up on drop.
pub struct AsyncWakeUpGuard<W>
where
    W: AsyncWakeUp,
{
    waker: W,
}

/// Common interface for types that can request a viewport wake-up.
pub trait AsyncWakeUp {
    /// Creates a guard that calls [`AsyncWakeUp::wake_up`] when dropped.
    #[must_use]
    fn wake_up_guard(&self) -> AsyncWakeUpGuard<&Self>
    where
        Self: Sized,
    {
        AsyncWakeUpGuard { waker: self }
    }

    /// Same as [`wake_up_guard()`](Self::wake_up_guard), but the guard owns
    /// the waker and can be moved into a task.
    #[must_use]
    fn wake_up_guard_owned(self) -> AsyncWakeUpGuard<Self>
    where
        Self: Sized,
    {
        AsyncWakeUpGuard { waker: self }
    }

    /// Requests a wake-up.
    fn wake_up(&self);
}

/// How a gate reaches a Tokio runtime to spawn its polling task.
///
/// Implemented for [`AsyncCurrentRuntime`] (thread-local context) and
/// [`Handle`] (explicit handle stored inside the gate).
pub trait AsyncRuntime {
    /// Spawns a future onto the runtime.
    ///
    /// # Panics
    ///
    /// Implementations may panic if their runtime access preconditions are
    /// not met.
    fn spawn<Fut, T>(&mut self, future: Fut) -> JoinHandle<T>
    where
        Fut: 'static + Send + Future<Output = T>,
        T: 'static + Send;
}

/// The default [`AsyncRuntime`]: the Tokio runtime entered on the current
/// thread.
///
/// Panics when no runtime context is available, e.g. on a UI thread that
/// never called [`Runtime::enter()`](tokio::runtime::Runtime::enter). Pass a
/// [`Handle`] explicitly in that case.
#[derive(Default, Clone, Copy, Debug)]
pub struct AsyncCurrentRuntime;

impl Default for AsyncViewport {
    fn default() -> Self {
        Self {
            wake_up_requested: Arc::new(AtomicBool::new(false)),
            wake_up: Arc::new(RwLock::new(None)),
        }
    }
}

impl AsyncWakeUp for AsyncViewport {
    fn wake_up(&self) {
        if self.request_wake_up() {
            let callback = self.callback();
            if let Some(callback) = callback {
                (callback)();
            }
        }
    }
}

impl AsyncViewport {
    /// Creates a new viewport with the given wake-up callback.
    #[must_use]
    pub fn new_with_wake_up(wake_up: AsyncWakeUpCallback) -> Self {
        let viewport = Self::default();
        let _ = viewport.replace_wake_up(Some(wake_up));
        viewport
    }

    /// Replaces the wake-up callback, returning the previous one.
    ///
    /// # Panics
    ///
    /// Panics if the callback lock is poisoned.
    #[must_use]
    pub fn replace_wake_up(
        &self,
        wake_up: Option<AsyncWakeUpCallback>,
    ) -> Option<AsyncWakeUpCallback> {
        replace(
            &mut *self
                .wake_up
                .write()
                .expect("Failed to write-lock AsyncViewport callback: poisoned by panic"),
            wake_up,
        )
    }

    /// Creates an [`AsyncWaitFor`] gate wired to this viewport, using
    /// `A::default()` as the runtime.
    ///
    /// # Panics
    ///
    /// Panics if the condition does not hold yet and runtime access
    /// preconditions of `A` are not met.
    #[must_use]
    pub fn new_wait_for<A, E, C>(
        &self,
        environment: E,
        condition: C,
        config: WaitForConfig,
    ) -> AsyncWaitFor<A>
    where
        A: Default + AsyncRuntime,
        E: 'static + Environment,
        C: Into<Condition>,
    {
        AsyncWaitFor::new(self.new_waker(), environment, condition, config)
    }

    /// Creates an [`AsyncWaitFor`] gate wired to this viewport with an
    /// explicit runtime.
    ///
    /// # Panics
    ///
    /// Panics if the condition does not hold yet and runtime access
    /// preconditions of `runtime` are not met.
    #[must_use]
    pub fn new_wait_for_with_runtime<A, E, C>(
        &self,
        environment: E,
        condition: C,
        config: WaitForConfig,
        runtime: A,
    ) -> AsyncWaitFor<A>
    where
        A: AsyncRuntime,
        E: 'static + Environment,
        C: Into<Condition>,
    {
        AsyncWaitFor::new_with_runtime(self.new_waker(), environment, condition, config, runtime)
    }

    /// Creates a new [`AsyncWaker`] for this viewport.
    #[must_use]
    pub fn new_waker(&self) -> AsyncWaker {
        AsyncWaker {
            wake_up_requested: self.wake_up_requested.clone(),
            wake_up: Arc::downgrade(&self.wake_up),
        }
    }

    /// Clears the pending wake-up flag.
    ///
    /// Call this at the start of every frame, before updating any gate, so
    /// that later wake-up requests are not swallowed.
    pub fn woke_up(&self) {
        self.wake_up_requested.store(false, Ordering::Relaxed);
    }

    /// Returns `true` if `self` and `other` represent the same viewport.
    #[must_use]
    pub fn is_same_viewport(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.wake_up_requested, &other.wake_up_requested)
    }

    fn request_wake_up(&self) -> bool {
        self.wake_up_requested
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    fn callback(&self) -> Option<AsyncWakeUpCallback> {
        self.wake_up
            .read()
            .expect("Failed to read-lock AsyncViewport callback: poisoned by panic")
            .clone()
    }
}

impl AsyncWakeUp for AsyncWaker {
    fn wake_up(&self) {
        if self
            .wake_up_requested
            .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let Some(slot) = self.wake_up.upgrade() else {
            // Nobody is left to clear the flag.
            self.wake_up_requested.store(false, Ordering::Relaxed);
            return;
        };
        let callback = slot
            .read()
            .expect("Failed to read-lock AsyncWaker callback: poisoned by panic")
            .clone();
        if let Some(callback) = callback {
            (callback)();
        }
    }
}

impl AsyncWaker {
    /// Returns `true` if the owning [`AsyncViewport`] is still alive.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.wake_up.strong_count() > 0
    }

    /// Returns `true` if `self` and `other` belong to the same viewport.
    #[must_use]
    pub fn is_same_viewport(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.wake_up_requested, &other.wake_up_requested)
    }
}

impl AsyncWakeUp for AsyncWakerList {
    fn wake_up(&self) {
        for waker in self.slots().slots.iter().flatten() {
            waker.wake_up();
        }
    }
}

impl AsyncWakerList {
    /// Registers a waker and returns the slot it occupies.
    ///
    /// Pass the slot to [`remove_waker()`](Self::remove_waker) exactly once
    /// when the waker is no longer needed; slots are reused afterwards.
    #[must_use]
    pub fn add_waker(&self, waker: AsyncWaker) -> usize {
        let mut slots = self.slots_mut();
        if let Some(idx) = slots.vacant.pop() {
            slots.slots[idx] = Some(waker);
            idx
        } else {
            slots.slots.push(Some(waker));
            slots.slots.len() - 1
        }
    }

    /// Releases a slot returned by [`add_waker()`](Self::add_waker),
    /// returning the waker it held.
    pub fn remove_waker(&self, idx: usize) -> Option<AsyncWaker> {
        let mut slots = self.slots_mut();
        let waker = slots.slots.get_mut(idx)?.take();
        if waker.is_some() {
            slots.vacant.push(idx);
        }
        waker
    }

    /// Returns the number of registered wakers.
    #[must_use]
    pub fn len(&self) -> usize {
        let slots = self.slots();
        slots.slots.len() - slots.vacant.len()
    }

    /// Returns `true` if no waker is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slots(&'_ self) -> RwLockReadGuard<'_, AsyncWakerSlots> {
        self.inner
            .read()
            .expect("Failed to read-lock AsyncWakerList: poisoned by panic in another thread")
    }

    fn slots_mut(&'_ self) -> RwLockWriteGuard<'_, AsyncWakerSlots> {
        self.inner
            .write()
            .expect("Failed to write-lock AsyncWakerList: poisoned by panic in another thread")
    }
}

impl<W> Drop for AsyncWakeUpGuard<W>
where
    W: AsyncWakeUp,
{
    fn drop(&mut self) {
        self.waker.wake_up();
    }
}

impl<T> AsyncWakeUp for &T
where
    T: AsyncWakeUp,
{
    fn wake_up(&self) {
        (*self).wake_up();
    }
}

impl AsyncRuntime for AsyncCurrentRuntime {
    fn spawn<Fut, T>(&mut self, future: Fut) -> JoinHandle<T>
    where
        Fut: 'static + Send + Future<Output = T>,
        T: 'static + Send,
    {
        ::tokio::spawn(future)
    }
}

impl AsyncRuntime for Handle {
    fn spawn<Fut, T>(&mut self, future: Fut) -> JoinHandle<T>
    where
        Fut: 'static + Send + Future<Output = T>,
        T: 'static + Send,
    {
        Handle::spawn(self, future)
    }
}
