//! Delegated-task runner (component B).
//!
//! rustls has no `SSLEngine`-style `NEED_TASK` status of its own — its
//! `process_new_packets` call is synchronous CPU work (certificate
//! verification, key derivation) rather than an explicitly delegatable
//! task. This runner re-creates the same effect regardless: the reactor
//! thread hands that CPU work to a dedicated single thread and
//! goes back to polling, instead of blocking the selector loop on a
//! handshake's crypto cost. While a connection's task is in flight its
//! selector interest is cleared by the caller (see
//! `reactor::ConnectionsManager`); this runner only owns the worker thread
//! and the job queue.

use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;

type Job = Box<dyn FnOnce() + Send + 'static>;

pub struct TaskRunner {
    sender: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl TaskRunner {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = std::thread::Builder::new()
            .name("valve-delegated-task".into())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .expect("failed to spawn delegated-task thread");
        Self {
            sender,
            handle: Some(handle),
        }
    }

    /// Enqueue CPU-bound work to run off the reactor thread. The job is
    /// responsible for posting its own result back (typically onto a
    /// `ConnectionsManager` wake-up queue) and waking the selector.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        // A closed receiver only happens during process shutdown, after the
        // runner itself has been dropped; submitting past that point is a
        // caller bug we surface loudly in debug builds and ignore otherwise.
        let _ = self.sender.send(Box::new(job));
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Dropping `sender` closes the channel; the worker thread's `recv`
        // loop then exits on its own.
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Default for TaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn submitted_job_runs_off_the_calling_thread() {
        let runner = TaskRunner::new();
        let done = Arc::new(AtomicBool::new(false));
        let done2 = done.clone();
        runner.submit(move || {
            done2.store(true, Ordering::SeqCst);
        });

        let mut waited = Duration::ZERO;
        while !done.load(Ordering::SeqCst) && waited < Duration::from_secs(1) {
            std::thread::sleep(Duration::from_millis(5));
            waited += Duration::from_millis(5);
        }
        assert!(done.load(Ordering::SeqCst));
    }
}
