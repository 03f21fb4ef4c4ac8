//! Playback scheduling: one timer per session, decode on the worker.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use sticker_core::{DecodeError, FrameSource};

use crate::clock::{Clock, TimerHandle};
use crate::executor::Executor;
use crate::player::ControlEvent;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Timer slot plus a generation counter.
///
/// Every `begin`/`end` bumps the generation under the timer lock, so work
/// tagged with an older generation can tell it has been superseded and a
/// timer can never be armed for a generation that already ended.
#[derive(Default)]
pub(crate) struct Session {
    generation: AtomicU64,
    timer: Mutex<Option<TimerHandle>>,
}

impl Session {
    /// Invalidate whatever is running and open a new generation.
    pub(crate) fn begin(&self) -> u64 {
        let mut timer = lock(&self.timer);
        if let Some(old) = timer.take() {
            old.invalidate();
        }
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Invalidate whatever is running; nothing from before survives.
    pub(crate) fn end(&self) {
        let mut timer = lock(&self.timer);
        if let Some(old) = timer.take() {
            old.invalidate();
        }
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Install `handle` as the timer of `generation`, replacing (and
    /// invalidating) any other. Refused if the generation is over.
    pub(crate) fn arm(&self, generation: u64, handle: TimerHandle) -> bool {
        let mut timer = lock(&self.timer);
        if self.generation.load(Ordering::SeqCst) != generation {
            handle.invalidate();
            return false;
        }
        if let Some(old) = timer.replace(handle) {
            old.invalidate();
        }
        true
    }

    /// Drop the timer of `generation` after a fatal decode error.
    pub(crate) fn abort(&self, generation: u64) {
        let mut timer = lock(&self.timer);
        if self.generation.load(Ordering::SeqCst) == generation {
            if let Some(old) = timer.take() {
                old.invalidate();
            }
        }
    }

    pub(crate) fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    pub(crate) fn is_running(&self) -> bool {
        lock(&self.timer).as_ref().is_some_and(TimerHandle::is_valid)
    }
}

type SharedSource = Arc<Mutex<Box<dyn FrameSource>>>;

/// Everything a generation needs on the worker side.
pub(crate) struct Playback {
    session: Weak<Session>,
    generation: u64,
    executor: Arc<dyn Executor>,
    events: Sender<ControlEvent>,
    /// Set while a decode job of this generation is queued or running.
    /// Ticks that find it set are dropped.
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when the decode job is done, even by unwinding.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl Playback {
    pub(crate) fn new(
        session: Weak<Session>,
        generation: u64,
        executor: Arc<dyn Executor>,
        events: Sender<ControlEvent>,
    ) -> Self {
        Self {
            session,
            generation,
            executor,
            events,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Build the frame source and arm its timer on `clock`. Runs on the worker.
    pub(crate) fn start(
        self,
        clock: &dyn Clock,
        open: impl FnOnce() -> Result<Box<dyn FrameSource>, DecodeError>,
    ) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        if !session.is_current(self.generation) {
            return;
        }
        let source = match open() {
            Ok(source) => source,
            Err(error) => {
                self.fail(&session, error);
                return;
            }
        };

        let fps = source.fps().max(1);
        let period = Duration::from_secs_f64(1.0 / fps as f64);
        let source: SharedSource = Arc::new(Mutex::new(source));

        let this = Arc::new(self);
        let ticker = this.clone();
        let handle = clock.schedule_repeating(
            period,
            Arc::new(move || ticker.schedule_tick(&source)),
        );
        if session.arm(this.generation, handle) {
            log::debug!("generation {} armed at {} fps", this.generation, fps);
        } else {
            log::debug!("generation {} superseded before arming", this.generation);
        }
    }

    /// Timer callback: hand one frame's worth of decoding to the worker.
    fn schedule_tick(self: &Arc<Self>, source: &SharedSource) {
        let live = self
            .session
            .upgrade()
            .is_some_and(|s| s.is_current(self.generation));
        if !live {
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            log::trace!("generation {} still decoding; tick skipped", self.generation);
            return;
        }
        let this = self.clone();
        let source = source.clone();
        self.executor.execute(Box::new(move || {
            let _done = InFlight(&this.in_flight);
            this.decode_tick(&source);
        }));
    }

    /// Worker side of a tick. A tick that started decoding finishes even if
    /// the session moves on meanwhile; its frame is just not sent.
    fn decode_tick(&self, source: &SharedSource) {
        let live = |s: &Weak<Session>| s.upgrade().filter(|s| s.is_current(self.generation));
        if live(&self.session).is_none() {
            return;
        }

        let (index, result) = {
            let mut source = lock(source);
            let index = source.frame_index();
            (index, source.next_frame())
        };

        let Some(session) = live(&self.session) else {
            log::trace!("dropping frame {index} of stale generation {}", self.generation);
            return;
        };
        match result {
            Ok(frame) => {
                let _ = self.events.send(ControlEvent::Frame {
                    generation: self.generation,
                    index,
                    frame,
                });
            }
            Err(error) => self.fail(&session, error),
        }
    }

    fn fail(&self, session: &Session, error: DecodeError) {
        session.abort(self.generation);
        let _ = self.events.send(ControlEvent::Failed {
            generation: self.generation,
            error,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{ManualClock, Tick};
    use crate::executor::Job;
    use std::sync::mpsc::channel;
    use sticker_core::{FrameBuffer, PixelLayout};

    /// Holds jobs until the test runs them, like a worker stuck on a slow frame.
    #[derive(Default)]
    struct ParkedExecutor {
        jobs: Mutex<Vec<Job>>,
    }

    impl ParkedExecutor {
        fn queued(&self) -> usize {
            lock(&self.jobs).len()
        }

        fn run_all(&self) {
            let jobs: Vec<Job> = lock(&self.jobs).drain(..).collect();
            for job in jobs {
                job();
            }
        }
    }

    impl Executor for ParkedExecutor {
        fn execute(&self, job: Job) {
            lock(&self.jobs).push(job);
        }
    }

    /// One-pixel frames whose only byte is the frame number.
    struct Counting(u32);

    impl FrameSource for Counting {
        fn fps(&self) -> u32 {
            30
        }

        fn frame_index(&self) -> u32 {
            self.0
        }

        fn next_frame(&mut self) -> Result<FrameBuffer, DecodeError> {
            let frame = FrameBuffer::new(1, 1, PixelLayout::Argb, vec![self.0 as u8; 4]);
            self.0 += 1;
            Ok(frame)
        }
    }

    #[test]
    fn test_slow_worker_keeps_one_job_per_session() {
        let session = Arc::new(Session::default());
        let clock = ManualClock::new();
        let executor = Arc::new(ParkedExecutor::default());
        let (events, received) = channel();
        let generation = session.begin();
        let playback = Playback::new(Arc::downgrade(&session), generation, executor.clone(), events);
        playback.start(&clock, || Ok(Box::new(Counting(0)) as Box<dyn FrameSource>));
        assert!(session.is_running());

        clock.fire_n(500);
        assert_eq!(executor.queued(), 1);

        executor.run_all();
        let indices: Vec<u32> = received
            .try_iter()
            .filter_map(|event| match event {
                ControlEvent::Frame { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, vec![0]);

        // The flag clears once the job is done, so the next tick queues again.
        clock.fire();
        assert_eq!(executor.queued(), 1);
        executor.run_all();
        assert!(matches!(received.try_recv(), Ok(ControlEvent::Frame { index: 1, .. })));
    }

    #[test]
    fn test_arm_refused_after_generation_ends() {
        let session = Session::default();
        let clock = ManualClock::new();
        let generation = session.begin();
        session.end();
        let tick: Tick = Arc::new(|| {});
        let handle = clock.schedule_repeating(Duration::from_millis(10), tick);
        assert!(!session.arm(generation, handle.clone()));
        assert!(!handle.is_valid());
        assert!(!session.is_running());
    }

    #[test]
    fn test_begin_invalidates_running_timer() {
        let session = Session::default();
        let clock = ManualClock::new();
        let first = session.begin();
        let tick: Tick = Arc::new(|| {});
        let handle = clock.schedule_repeating(Duration::from_millis(10), tick);
        assert!(session.arm(first, handle.clone()));
        assert!(session.is_running());

        let second = session.begin();
        assert_ne!(first, second);
        assert!(!handle.is_valid());
        assert!(!session.is_running());
        assert_eq!(clock.live_timers(), 0);
    }

    #[test]
    fn test_abort_only_touches_its_own_generation() {
        let session = Session::default();
        let clock = ManualClock::new();
        let stale = session.begin();
        let current = session.begin();
        let tick: Tick = Arc::new(|| {});
        let handle = clock.schedule_repeating(Duration::from_millis(10), tick);
        assert!(session.arm(current, handle.clone()));
        session.abort(stale);
        assert!(handle.is_valid());
        session.abort(current);
        assert!(!handle.is_valid());
    }
}
