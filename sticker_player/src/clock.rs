//! Repeating timers.
//!
//! A timer only *fires*; ticks are expected to hand real work to the
//! [`Executor`](crate::Executor) and return at once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub type Tick = Arc<dyn Fn() + Send + Sync>;

/// Shared validity flag of one armed timer.
///
/// Invalidation is final: the clock drops the timer and never fires it again.
#[derive(Debug, Clone)]
pub struct TimerHandle {
    alive: Arc<AtomicBool>,
}

impl TimerHandle {
    fn new() -> Self {
        Self {
            alive: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn invalidate(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn is_valid(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }
}

pub trait Clock: Send + Sync {
    /// Fire `tick` every `period` until the returned handle is invalidated.
    /// The first tick comes one period after arming.
    fn schedule_repeating(&self, period: Duration, tick: Tick) -> TimerHandle;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ── Real time ──────────────────────────────────────────────────────────────

struct Scheduled {
    due: Instant,
    period: Duration,
    handle: TimerHandle,
    tick: Tick,
}

#[derive(Default)]
struct ClockState {
    timers: Vec<Scheduled>,
    shutdown: bool,
}

/// All timers of a process on one sleeper thread.
///
/// A timer that falls behind (because ticks are slow or the machine was
/// suspended) skips the missed ticks instead of bursting to catch up.
pub struct ThreadClock {
    shared: Arc<(Mutex<ClockState>, Condvar)>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadClock {
    pub fn spawn() -> anyhow::Result<Self> {
        let shared = Arc::new((Mutex::new(ClockState::default()), Condvar::new()));
        let worker = shared.clone();
        let thread = thread::Builder::new()
            .name("sticker-clock".into())
            .spawn(move || run_clock(&worker))?;
        Ok(Self {
            shared,
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Number of timers that are still armed.
    pub fn live_timers(&self) -> usize {
        let (state, _) = &*self.shared;
        lock(state).timers.iter().filter(|t| t.handle.is_valid()).count()
    }
}

fn run_clock(shared: &(Mutex<ClockState>, Condvar)) {
    let (state, wakeup) = shared;
    let mut guard = lock(state);
    loop {
        if guard.shutdown {
            return;
        }
        guard.timers.retain(|t| t.handle.is_valid());

        let now = Instant::now();
        let Some(next_due) = guard.timers.iter().map(|t| t.due).min() else {
            guard = wakeup.wait(guard).unwrap_or_else(|p| p.into_inner());
            continue;
        };
        if next_due > now {
            guard = wakeup
                .wait_timeout(guard, next_due - now)
                .map(|(g, _)| g)
                .unwrap_or_else(|p| p.into_inner().0);
            continue;
        }

        let mut due = Vec::new();
        for timer in guard.timers.iter_mut().filter(|t| t.due <= now) {
            timer.due += timer.period;
            if timer.due <= now {
                timer.due = now + timer.period;
            }
            due.push((timer.handle.clone(), timer.tick.clone()));
        }
        drop(guard);
        for (handle, tick) in due {
            if handle.is_valid() {
                tick();
            }
        }
        guard = lock(state);
    }
}

impl Clock for ThreadClock {
    fn schedule_repeating(&self, period: Duration, tick: Tick) -> TimerHandle {
        let handle = TimerHandle::new();
        let (state, wakeup) = &*self.shared;
        lock(state).timers.push(Scheduled {
            due: Instant::now() + period,
            period,
            handle: handle.clone(),
            tick,
        });
        wakeup.notify_one();
        handle
    }
}

impl Drop for ThreadClock {
    fn drop(&mut self) {
        let (state, wakeup) = &*self.shared;
        lock(state).shutdown = true;
        wakeup.notify_one();
        if let Some(thread) = lock(&self.thread).take() {
            if thread.join().is_err() {
                log::error!("clock thread panicked");
            }
        }
    }
}

// ── Manual time ────────────────────────────────────────────────────────────

/// A clock that only ticks when told to.
#[derive(Default)]
pub struct ManualClock {
    timers: Mutex<Vec<(TimerHandle, Duration, Tick)>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire every live timer once. Returns how many fired.
    pub fn fire(&self) -> usize {
        let due: Vec<(TimerHandle, Tick)> = {
            let mut timers = lock(&self.timers);
            timers.retain(|(handle, _, _)| handle.is_valid());
            timers.iter().map(|(h, _, t)| (h.clone(), t.clone())).collect()
        };
        let mut fired = 0;
        for (handle, tick) in due {
            if handle.is_valid() {
                tick();
                fired += 1;
            }
        }
        fired
    }

    /// Fire every live timer `n` times.
    pub fn fire_n(&self, n: usize) -> usize {
        (0..n).map(|_| self.fire()).sum()
    }

    pub fn live_timers(&self) -> usize {
        lock(&self.timers).iter().filter(|(h, _, _)| h.is_valid()).count()
    }

    /// Periods of the live timers, in arming order.
    pub fn periods(&self) -> Vec<Duration> {
        lock(&self.timers)
            .iter()
            .filter(|(h, _, _)| h.is_valid())
            .map(|(_, p, _)| *p)
            .collect()
    }
}

impl Clock for ManualClock {
    fn schedule_repeating(&self, period: Duration, tick: Tick) -> TimerHandle {
        let handle = TimerHandle::new();
        lock(&self.timers).push((handle.clone(), period, tick));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, Tick) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, Arc::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_manual_clock_fires_until_invalidated() {
        let clock = ManualClock::new();
        let (count, tick) = counter();
        let handle = clock.schedule_repeating(Duration::from_millis(33), tick);
        assert_eq!(clock.fire_n(3), 3);
        handle.invalidate();
        assert_eq!(clock.fire(), 0);
        assert_eq!(count.load(Ordering::SeqCst), 3);
        assert_eq!(clock.live_timers(), 0);
    }

    #[test]
    fn test_thread_clock_repeats_and_stops() {
        let clock = ThreadClock::spawn().unwrap();
        let (count, tick) = counter();
        let handle = clock.schedule_repeating(Duration::from_millis(5), tick);
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(count.load(Ordering::SeqCst) >= 3);

        handle.invalidate();
        // A tick already past its validity check may still land.
        thread::sleep(Duration::from_millis(20));
        let after = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(count.load(Ordering::SeqCst), after);
    }
}
