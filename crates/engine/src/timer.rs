use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

type Callback = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
    Paused,
    Expired,
}

struct Inner {
    state: TimerState,
    accumulated: Duration,
    resumed_at: Option<Instant>,
    target: Option<Duration>,
    callback: Option<Callback>,
    /// Bumped whenever a scheduled wake-up becomes obsolete.
    epoch: u64,
    wakeup: Option<JoinHandle<()>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            state: TimerState::Idle,
            accumulated: Duration::ZERO,
            resumed_at: None,
            target: None,
            callback: None,
            epoch: 0,
            wakeup: None,
        }
    }
}

impl Inner {
    fn elapsed_at(&self, now: Instant) -> Duration {
        self.accumulated + self.resumed_at.map(|at| now.duration_since(at)).unwrap_or_default()
    }

    fn remaining_at(&self, now: Instant) -> Option<Duration> {
        self.target.map(|t| t.saturating_sub(self.elapsed_at(now)))
    }

    fn cancel_wakeup(&mut self) {
        self.epoch += 1;
        if let Some(handle) = self.wakeup.take() {
            handle.abort();
        }
    }

    fn freeze(&mut self, now: Instant) {
        self.accumulated = self.elapsed_at(now);
        self.resumed_at = None;
    }

    /// Moves to `Expired` and hands back the callback for the caller to run
    /// once the lock is released.
    fn expire(&mut self, now: Instant) -> Option<Callback> {
        self.freeze(now);
        self.cancel_wakeup();
        self.state = TimerState::Expired;
        self.callback.take()
    }
}

/// Measures active (unpaused) time toward an optional target and fires a
/// one-shot callback when the target is reached.
///
/// Cloning yields another handle to the same timer. Time comes from
/// `tokio::time`, so a paused test clock drives it deterministically.
#[derive(Clone, Default)]
pub struct IntervalTimer {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for IntervalTimer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("IntervalTimer")
            .field("state", &inner.state)
            .field("elapsed", &inner.elapsed_at(Instant::now()))
            .field("target", &inner.target)
            .finish()
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl IntervalTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts counting from zero with no target. Any previous run is discarded.
    pub fn start(&self, on_expire: impl FnOnce() + Send + 'static) {
        let mut inner = lock(&self.inner);
        inner.cancel_wakeup();
        let epoch = inner.epoch;
        *inner = Inner {
            epoch,
            ..Inner::default()
        };
        inner.state = TimerState::Running;
        inner.resumed_at = Some(Instant::now());
        inner.callback = Some(Box::new(on_expire));
    }

    /// Replaces the target without touching accumulated time.
    ///
    /// `None` keeps counting without ever firing. A target that has already
    /// been reached fires the callback before this returns.
    pub fn update(&self, target: Option<Duration>) {
        let fire = {
            let mut inner = lock(&self.inner);
            if matches!(inner.state, TimerState::Idle | TimerState::Expired) {
                return;
            }
            inner.target = target;
            inner.cancel_wakeup();
            let now = Instant::now();
            match inner.remaining_at(now) {
                Some(remaining) if remaining.is_zero() => inner.expire(now),
                Some(_) if inner.state == TimerState::Running => {
                    self.schedule(&mut inner);
                    None
                }
                _ => None,
            }
        };
        if let Some(callback) = fire {
            callback();
        }
    }

    pub fn pause(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != TimerState::Running {
            return;
        }
        inner.freeze(Instant::now());
        inner.cancel_wakeup();
        inner.state = TimerState::Paused;
    }

    pub fn resume(&self) {
        let mut inner = lock(&self.inner);
        if inner.state != TimerState::Paused {
            return;
        }
        inner.resumed_at = Some(Instant::now());
        inner.state = TimerState::Running;
        if inner.target.is_some() {
            self.schedule(&mut inner);
        }
    }

    pub fn reset(&self) {
        let mut inner = lock(&self.inner);
        inner.cancel_wakeup();
        let epoch = inner.epoch;
        *inner = Inner {
            epoch,
            ..Inner::default()
        };
    }

    pub fn elapsed(&self) -> Duration {
        lock(&self.inner).elapsed_at(Instant::now())
    }

    pub fn remaining(&self) -> Option<Duration> {
        lock(&self.inner).remaining_at(Instant::now())
    }

    pub fn target(&self) -> Option<Duration> {
        lock(&self.inner).target
    }

    pub fn is_expired(&self) -> bool {
        lock(&self.inner).state == TimerState::Expired
    }

    pub fn state(&self) -> TimerState {
        lock(&self.inner).state
    }

    fn schedule(&self, inner: &mut Inner) {
        inner.cancel_wakeup();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("no tokio runtime; timer expiry will only be checked on update");
            return;
        };
        let epoch = inner.epoch;
        let weak = Arc::downgrade(&self.inner);
        inner.wakeup = Some(runtime.spawn(wait_for_expiry(weak, epoch)));
    }
}

async fn wait_for_expiry(weak: Weak<Mutex<Inner>>, epoch: u64) {
    loop {
        let delay = {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let mut inner = lock(&shared);
            if inner.epoch != epoch || inner.state != TimerState::Running {
                return;
            }
            let now = Instant::now();
            match inner.remaining_at(now) {
                None => return,
                Some(remaining) if remaining.is_zero() => {
                    let callback = inner.expire(now);
                    drop(inner);
                    if let Some(callback) = callback {
                        callback();
                    }
                    return;
                }
                Some(remaining) => remaining,
            }
        };
        tokio::time::sleep(delay).await;
    }
}
