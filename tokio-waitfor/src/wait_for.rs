// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readiness gate: poll a [`Condition`] until it holds.
//!
//! [`AsyncWaitFor`] checks its condition once when created and, if that is
//! not enough, keeps checking it from a task on a Tokio runtime. The UI
//! reads the outcome every frame through a non-blocking API.

use ::std::future::pending;
use ::std::mem::replace;
use ::std::ops::ControlFlow;
use ::std::panic::resume_unwind;
use ::std::pin::pin;
use ::std::sync::{Arc, Mutex, PoisonError, RwLock};

use ::futures_util::FutureExt as _;
use ::tokio::select;
use ::tokio::task::JoinHandle;
use ::tokio::time::{self, Instant, Interval, MissedTickBehavior};
use ::tracing::{debug, trace};

use crate::condition::{Condition, Environment};
use crate::config::WaitForConfig;
use crate::signal::{ReadySender, ReadySignal};
use crate::{AsyncCurrentRuntime, AsyncRuntime, AsyncWakeUp, AsyncWakeUpGuard, AsyncWaker};

/// Waits for a [`Condition`] to hold and reports it to an immediate mode UI.
///
/// The gate is either *waiting* or *ready*. Creating it checks the condition
/// right away; if it already holds the gate starts ready and no task is
/// spawned. Otherwise a polling task re-checks the condition every
/// [`interval`](WaitForConfig::interval) until it holds, at which point the
/// gate becomes ready, the associated viewport is woken up and polling
/// stops. A gate never goes back from ready to waiting.
///
/// If a [`timeout`](WaitForConfig::timeout) is configured and elapses first,
/// polling stops and the gate stays waiting. This is not reported as an
/// error; callers that need a deadline of their own can use
/// [`ReadySignal::wait_timeout()`].
///
/// Call [`update()`](Self::update) every frame, the same way a hook is
/// called on every render:
///
/// * the condition passed in replaces the previous one **without**
///   restarting the timers, and the next tick checks the new condition;
/// * a config that differs from the active one tears the timers down and
///   re-arms them with the new interval and timeout.
///
/// `A` controls how the Tokio runtime is reached. The default
/// [`AsyncCurrentRuntime`] uses the thread-local runtime context, while a
/// [`Handle`](tokio::runtime::Handle) is stored inside the gate and works on
/// threads where that context is not available.
///
/// # Teardown
///
/// [`deactivate()`](Self::deactivate) and dropping the gate stop the
/// polling task. Once either returns, the condition is not evaluated again
/// by that task, even if a tick was already due: every check runs under a
/// lock that teardown takes before aborting the task. Teardown waits for a
/// check that is already running, but never blocks on the runtime.
///
/// # Panics in conditions
///
/// The gate does not catch panics raised by a predicate. A panic during the
/// initial check unwinds out of the constructor or
/// [`activate()`](Self::activate); a panic during a tick ends
/// the polling task and is re-raised by the next [`poll()`](Self::poll) or
/// [`update()`](Self::update).
pub struct AsyncWaitFor<A = AsyncCurrentRuntime>
where
    A: AsyncRuntime,
{
    condition: Arc<RwLock<Condition>>,
    environment: Arc<dyn Environment>,
    ready: ReadySender,
    signal: ReadySignal,
    config: WaitForConfig,
    polling: Polling,
    waker: AsyncWaker,
    runtime: A,
}

enum Polling {
    /// Deactivated, or never armed.
    Inactive,
    /// A polling task owns the interval and timeout.
    Running(PollTask),
    /// Active, but no timers are left: the condition was met or the timeout
    /// elapsed.
    Settled,
}

struct PollTask {
    armed: Arc<Mutex<bool>>,
    join_handle: JoinHandle<()>,
}

/// State shared between a gate and its polling task.
struct Ticker {
    armed: Arc<Mutex<bool>>,
    condition: Arc<RwLock<Condition>>,
    environment: Arc<dyn Environment>,
    ready: ReadySender,
}

impl<A> Drop for AsyncWaitFor<A>
where
    A: AsyncRuntime,
{
    fn drop(&mut self) {
        self.deactivate();
    }
}

impl<A> AsyncWaitFor<A>
where
    A: Default + AsyncRuntime,
{
    /// Creates a gate using `A::default()` as the runtime.
    ///
    /// # Panics
    ///
    /// Panics if the condition does not hold yet and runtime access
    /// preconditions are not met by `A`. For example,
    /// [`AsyncCurrentRuntime`] panics when called outside a Tokio runtime
    /// context.
    #[must_use]
    pub fn new<E, C>(waker: AsyncWaker, environment: E, condition: C, config: WaitForConfig) -> Self
    where
        E: 'static + Environment,
        C: Into<Condition>,
    {
        Self::new_with_runtime(waker, environment, condition, config, A::default())
    }
}

impl<A> AsyncWaitFor<A>
where
    A: AsyncRuntime,
{
    /// Creates a gate with an explicit runtime.
    ///
    /// The condition is checked once before this returns. If it holds, the
    /// gate is ready and no task is spawned.
    ///
    /// # Panics
    ///
    /// Panics if the condition does not hold yet and runtime access
    /// preconditions are not met by `runtime`.
    #[must_use]
    pub fn new_with_runtime<E, C>(
        waker: AsyncWaker,
        environment: E,
        condition: C,
        config: WaitForConfig,
        runtime: A,
    ) -> Self
    where
        E: 'static + Environment,
        C: Into<Condition>,
    {
        let condition = condition.into();
        let environment: Arc<dyn Environment> = Arc::new(environment);
        let ready = ReadySender::new(condition.check(&*environment));
        let signal = ready.subscribe_with_waker(waker.clone());

        let mut gate = Self {
            condition: Arc::new(RwLock::new(condition)),
            environment,
            ready,
            signal,
            config,
            polling: Polling::Inactive,
            waker,
            runtime,
        };
        gate.arm();
        gate
    }

    /// Per-frame entry point.
    ///
    /// Replaces the condition, reaps a finished polling task, applies
    /// `config` and returns whether the gate is ready.
    ///
    /// # Panics
    ///
    /// Re-raises a panic raised by the condition inside the polling task.
    /// Panics if re-arming with a new config fails runtime access
    /// preconditions.
    pub fn update<C>(&mut self, condition: C, config: WaitForConfig) -> bool
    where
        C: Into<Condition>,
    {
        self.set_condition(condition);
        self.poll();
        self.reconfigure(config);
        self.is_ready()
    }

    /// Replaces the condition checked by future ticks.
    ///
    /// Timers are left untouched and the new condition is not checked
    /// immediately; the next scheduled tick checks it.
    ///
    /// # Panics
    ///
    /// Panics if the condition lock is poisoned.
    pub fn set_condition<C>(&mut self, condition: C)
    where
        C: Into<Condition>,
    {
        *self
            .condition
            .write()
            .expect("Failed to write-lock AsyncWaitFor condition: poisoned by panic") =
            condition.into();
    }

    /// Returns the condition future ticks will check.
    ///
    /// # Panics
    ///
    /// Panics if the condition lock is poisoned.
    #[must_use]
    pub fn condition(&self) -> Condition {
        self.condition
            .read()
            .expect("Failed to read-lock AsyncWaitFor condition: poisoned by panic")
            .clone()
    }

    /// Applies a new interval and timeout.
    ///
    /// A config equal to the active one is a no-op. Otherwise, if the gate is
    /// active and not ready yet, the current timers are torn down and new
    /// ones are armed, starting from now. This also restarts a gate whose
    /// previous timeout already elapsed. An inactive gate only records the
    /// config for the next [`activate()`](Self::activate).
    ///
    /// # Panics
    ///
    /// Panics if runtime access preconditions are not met by the runtime.
    pub fn reconfigure(&mut self, config: WaitForConfig) {
        if config == self.config {
            return;
        }
        self.config = config;

        match replace(&mut self.polling, Polling::Inactive) {
            Polling::Inactive => {}

            Polling::Running(task) => {
                task.cancel();
                self.arm();
            }

            Polling::Settled => self.arm(),
        }
    }

    /// Returns the active interval and timeout.
    #[must_use]
    pub fn config(&self) -> WaitForConfig {
        self.config
    }

    /// Reaps the polling task if it finished.
    ///
    /// Readiness is published by the task itself, so calling this is only
    /// needed to surface panics and release the task handle early.
    /// [`update()`](Self::update) calls it.
    ///
    /// # Panics
    ///
    /// Re-raises a panic raised by the condition inside the polling task.
    pub fn poll(&mut self) {
        let finished = matches!(
            &self.polling,
            Polling::Running(task) if task.join_handle.is_finished()
        );
        if !finished {
            return;
        }

        if let Polling::Running(task) = replace(&mut self.polling, Polling::Settled)
            && let Some(Err(error)) = task.join_handle.now_or_never()
            && error.is_panic()
        {
            resume_unwind(error.into_panic());
        }
    }

    /// Returns `true` once the condition has been met.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.signal.is_ready()
    }

    /// Returns a [`ReadySignal`] for this gate, without a waker.
    #[must_use]
    pub fn signal(&self) -> ReadySignal {
        self.ready.subscribe()
    }

    /// Returns a [`ReadySignal`] that wakes `waker`'s viewport when the gate
    /// becomes ready.
    #[must_use]
    pub fn signal_with_waker(&self, waker: AsyncWaker) -> ReadySignal {
        self.ready.subscribe_with_waker(waker)
    }

    /// Activates the gate again after [`deactivate()`](Self::deactivate).
    ///
    /// Like construction, this checks the condition right away: if it holds,
    /// the gate becomes ready and nothing is spawned. Otherwise the timers
    /// are armed starting from now. Does nothing if the gate is already
    /// active.
    ///
    /// # Panics
    ///
    /// Panics if runtime access preconditions are not met by the runtime.
    /// A panic raised by the condition unwinds out of this call.
    pub fn activate(&mut self) {
        if !matches!(self.polling, Polling::Inactive) {
            return;
        }

        if !self.is_ready() {
            let condition = self.condition();
            if condition.check(&*self.environment) && self.ready.mark_ready() {
                debug!(?condition, "readiness gate is ready on activation");
            }
        }
        self.arm();
    }

    /// Stops polling. Idempotent.
    ///
    /// After this returns, the condition is not evaluated again until the
    /// gate is activated again. Readiness already reached is kept.
    pub fn deactivate(&mut self) {
        if let Polling::Running(task) = replace(&mut self.polling, Polling::Inactive) {
            task.cancel();
            debug!("readiness gate deactivated");
        }
    }

    fn arm(&mut self) {
        if self.is_ready() {
            self.polling = Polling::Settled;
            return;
        }

        let armed = Arc::new(Mutex::new(true));
        let ticker = Ticker {
            armed: armed.clone(),
            condition: self.condition.clone(),
            environment: self.environment.clone(),
            ready: self.ready.clone(),
        };
        let wake_up_guard = self.waker.clone().wake_up_guard_owned();

        debug!(
            interval = ?self.config.interval(),
            timeout = ?self.config.timeout(),
            "readiness gate armed",
        );
        let join_handle = self
            .runtime
            .spawn(ticker.run(Instant::now(), self.config, wake_up_guard));

        self.polling = Polling::Running(PollTask { armed, join_handle });
    }
}

impl PollTask {
    fn cancel(self) {
        // A tick that panicked poisons the lock; the flag is still meaningful.
        *self.armed.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.join_handle.abort();
    }
}

impl Ticker {
    async fn run(
        self,
        start: Instant,
        config: WaitForConfig,
        _wake_up_guard: AsyncWakeUpGuard<AsyncWaker>,
    ) {
        // Instants too far out to represent are never reached.
        let mut interval = start.checked_add(config.interval()).map(|first_tick| {
            let mut interval = time::interval_at(first_tick, config.interval());
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let deadline = config
            .timeout()
            .and_then(|timeout| start.checked_add(timeout));
        let mut give_up = pin!(async move {
            match deadline {
                Some(deadline) => time::sleep_until(deadline).await,
                None => pending::<()>().await,
            }
        });

        loop {
            select! {
                biased;

                () = &mut give_up => {
                    self.give_up();
                    break;
                }

                () = next_tick(interval.as_mut()) => {
                    if self.tick().is_break() {
                        break;
                    }
                }
            }
        }
    }

    fn tick(&self) -> ControlFlow<()> {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if !*armed {
            return ControlFlow::Break(());
        }

        let condition = self
            .condition
            .read()
            .expect("Failed to read-lock AsyncWaitFor condition: poisoned by panic")
            .clone();
        trace!(?condition, "checking condition");
        if !condition.check(&*self.environment) {
            return ControlFlow::Continue(());
        }

        *armed = false;
        if self.ready.mark_ready() {
            debug!(?condition, "readiness gate is ready");
        }
        ControlFlow::Break(())
    }

    fn give_up(&self) {
        let mut armed = self.armed.lock().unwrap_or_else(PoisonError::into_inner);
        if *armed {
            *armed = false;
            debug!("readiness gate timed out, no longer polling");
        }
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending::<()>().await,
    }
}
