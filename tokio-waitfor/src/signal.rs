// SPDX-License-Identifier: Apache-2.0 OR MIT

use ::std::future::pending;
use ::std::mem::replace;
use ::std::time::Duration;

use ::thiserror::Error;
use ::tokio::sync::watch;
use ::tokio::time::timeout;

use crate::{AsyncWakeUp, AsyncWaker, AsyncWakerList};

/// Observes whether an [`AsyncWaitFor`](crate::AsyncWaitFor) gate is ready.
///
/// Obtained from [`AsyncWaitFor::signal()`](crate::AsyncWaitFor::signal).
/// The signal stays valid after the gate is dropped: it keeps reporting the
/// last published value.
///
/// A signal optionally carries an [`AsyncWaker`] whose viewport is woken up
/// when the gate becomes ready. [`Clone`] produces a copy **without** a
/// waker; use [`clone_with_waker()`](Self::clone_with_waker) to register
/// another viewport.
pub struct ReadySignal {
    receiver: watch::Receiver<bool>,
    registration: WakerRegistration,
}

/// Error returned by [`ReadySignal::wait_timeout()`].
///
/// The gate itself never fails; this only tells the caller that it gave up
/// waiting on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WaitError {
    #[error("condition was not met within {0:?}")]
    TimedOut(Duration),
}

/// Publishing side owned by the gate and its polling task.
#[derive(Clone)]
pub(crate) struct ReadySender {
    sender: watch::Sender<bool>,
    wakers: AsyncWakerList,
}

struct WakerRegistration {
    wakers: AsyncWakerList,
    slot: Option<usize>,
}

impl ReadySender {
    pub(crate) fn new(ready: bool) -> Self {
        Self {
            sender: watch::Sender::new(ready),
            wakers: AsyncWakerList::default(),
        }
    }

    pub(crate) fn is_ready(&self) -> bool {
        *self.sender.borrow()
    }

    /// Flips the value to `true`. Returns `false` if it already was.
    pub(crate) fn mark_ready(&self) -> bool {
        let flipped = self.sender.send_if_modified(|ready| !replace(ready, true));
        if flipped {
            self.wakers.wake_up();
        }
        flipped
    }

    pub(crate) fn subscribe(&self) -> ReadySignal {
        ReadySignal {
            receiver: self.sender.subscribe(),
            registration: WakerRegistration::unregistered(self.wakers.clone()),
        }
    }

    pub(crate) fn subscribe_with_waker(&self, waker: AsyncWaker) -> ReadySignal {
        ReadySignal {
            receiver: self.sender.subscribe(),
            registration: WakerRegistration::registered(self.wakers.clone(), waker),
        }
    }
}

impl Clone for ReadySignal {
    fn clone(&self) -> Self {
        Self {
            receiver: self.receiver.clone(),
            registration: WakerRegistration::unregistered(self.registration.wakers.clone()),
        }
    }
}

impl ReadySignal {
    /// Returns `true` once the gate's condition has been met.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Waits until the gate is ready.
    ///
    /// Completes immediately if it already is. A gate that timed out, or was
    /// dropped before its condition was met, never becomes ready, and this
    /// future then never completes. Use [`wait_timeout()`](Self::wait_timeout)
    /// to bound the wait.
    pub async fn wait(&mut self) {
        let closed = self.receiver.wait_for(|ready| *ready).await.is_err();
        if closed {
            pending::<()>().await;
        }
    }

    /// Like [`wait()`](Self::wait), but gives up after `duration`.
    ///
    /// # Errors
    ///
    /// Returns [`WaitError::TimedOut`] if the gate did not become ready in
    /// time. The gate is not affected and may still become ready later.
    pub async fn wait_timeout(&mut self, duration: Duration) -> Result<(), WaitError> {
        timeout(duration, self.wait())
            .await
            .map_err(|_| WaitError::TimedOut(duration))
    }

    /// Clones this signal and registers `waker` on the copy.
    #[must_use]
    pub fn clone_with_waker(&self, waker: AsyncWaker) -> Self {
        Self {
            receiver: self.receiver.clone(),
            registration: WakerRegistration::registered(self.registration.wakers.clone(), waker),
        }
    }

    /// Returns `true` if both signals observe the same gate.
    #[must_use]
    pub fn same_gate(&self, other: &Self) -> bool {
        self.receiver.same_channel(&other.receiver)
    }
}

impl Drop for WakerRegistration {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            let _ = self.wakers.remove_waker(slot);
        }
    }
}

impl WakerRegistration {
    fn registered(wakers: AsyncWakerList, waker: AsyncWaker) -> Self {
        let slot = wakers.add_waker(waker);
        Self {
            wakers,
            slot: Some(slot),
        }
    }

    fn unregistered(wakers: AsyncWakerList) -> Self {
        Self { wakers, slot: None }
    }
}
