//! Where decode work runs.
//!
//! Every player built from one [`PlayerContext`](crate::PlayerContext) shares
//! the same executor, which bounds the CPU spent on stickers no matter how
//! many are animating at once.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{channel, Sender};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Executor: Send + Sync {
    fn execute(&self, job: Job);
}

/// Runs every job on the calling thread, immediately.
///
/// Makes playback fully deterministic when paired with
/// [`ManualClock`](crate::ManualClock).
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// A single background worker draining a FIFO of jobs.
///
/// Jobs run strictly in submission order. A panicking job is logged and
/// swallowed so one broken asset cannot take the worker down with it.
pub struct DecodeQueue {
    sender: Mutex<Option<Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DecodeQueue {
    pub fn spawn(name: &str) -> anyhow::Result<Self> {
        let (sender, receiver) = channel::<Job>();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        log::error!("decode job panicked; worker continues");
                    }
                }
                log::debug!("decode worker exiting");
            })?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop accepting jobs, let queued ones finish and join the worker.
    pub fn shutdown(&self) {
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if worker.thread().id() != thread::current().id() && worker.join().is_err() {
                log::error!("decode worker panicked during shutdown");
            }
        }
    }
}

impl Executor for DecodeQueue {
    fn execute(&self, job: Job) {
        let sent = match self.sender.lock() {
            Ok(sender) => sender.as_ref().map(|s| s.send(job).is_ok()),
            Err(_) => None,
        };
        if sent != Some(true) {
            log::debug!("decode queue is shut down; dropping job");
        }
    }
}

impl Drop for DecodeQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_queue_runs_jobs_in_order_off_thread() {
        let queue = DecodeQueue::spawn("test-decode").unwrap();
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();
        for i in 0..5 {
            let tx = tx.clone();
            queue.execute(Box::new(move || {
                tx.send((i, thread::current().id() != caller)).unwrap();
            }));
        }
        let got: Vec<(i32, bool)> = (0..5)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).unwrap())
            .collect();
        assert_eq!(got, (0..5).map(|i| (i, true)).collect::<Vec<_>>());
    }

    #[test]
    fn test_panicking_job_does_not_kill_worker() {
        let queue = DecodeQueue::spawn("test-panic").unwrap();
        queue.execute(Box::new(|| panic!("bad frame")));
        let (tx, rx) = mpsc::channel();
        queue.execute(Box::new(move || tx.send(42).unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 42);
    }

    #[test]
    fn test_jobs_after_shutdown_are_dropped() {
        let queue = DecodeQueue::spawn("test-shutdown").unwrap();
        queue.shutdown();
        let (tx, rx) = mpsc::channel::<()>();
        queue.execute(Box::new(move || tx.send(()).unwrap()));
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
