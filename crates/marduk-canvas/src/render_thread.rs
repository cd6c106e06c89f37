//! Owning thread for manager state.
//!
//! Endpoint binding and destruction, shutdown and disable all run here, so
//! the live-endpoint set has a single writer.

use std::sync::Mutex;
use std::thread::{self, JoinHandle, ThreadId};

use crossbeam::channel::{Sender, bounded, unbounded};

use crate::error::TransportError;
use crate::sync::lock;

type Task = Box<dyn FnOnce() + Send>;

/// A named thread draining a task queue in order.
pub struct RenderThread {
    tasks: Mutex<Option<Sender<Task>>>,
    id: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RenderThread {
    pub fn spawn(name: &str) -> Result<Self, TransportError> {
        let (tx, rx) = unbounded::<Task>();
        let handle = thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || {
                for task in rx {
                    task();
                }
                log::debug!("render thread drained");
            })
            .map_err(|e| TransportError::Spawn(e.to_string()))?;

        Ok(Self {
            tasks: Mutex::new(Some(tx)),
            id: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    #[inline]
    pub fn is_current(&self) -> bool {
        thread::current().id() == self.id
    }

    /// Queues `task`. Returns `false` once the thread is stopped.
    pub fn dispatch(&self, task: impl FnOnce() + Send + 'static) -> bool {
        match lock(&self.tasks).as_ref() {
            Some(tx) => tx.send(Box::new(task)).is_ok(),
            None => false,
        }
    }

    /// Runs `task` on the thread and waits for its result. Runs inline when
    /// already on the thread. `None` once the thread is stopped.
    pub fn dispatch_sync<R: Send + 'static>(
        &self,
        task: impl FnOnce() -> R + Send + 'static,
    ) -> Option<R> {
        if self.is_current() {
            return Some(task());
        }
        let (reply_tx, reply_rx) = bounded(1);
        if !self.dispatch(move || {
            let _ = reply_tx.send(task());
        }) {
            return None;
        }
        reply_rx.recv().ok()
    }

    /// Lets queued tasks finish and joins the thread. Idempotent.
    pub fn stop(&self) {
        lock(&self.tasks).take();
        if self.is_current() {
            return;
        }
        let handle = lock(&self.handle).take();
        if handle.is_some_and(|h| h.join().is_err()) {
            log::error!("render thread panicked");
        }
    }
}

impl Drop for RenderThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn tasks_run_in_order_on_the_thread() {
        let rt = Arc::new(RenderThread::spawn("test-render").unwrap());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..10 {
            let seen = seen.clone();
            assert!(rt.dispatch(move || seen.lock().unwrap().push(i)));
        }
        let rt2 = rt.clone();
        assert_eq!(rt.dispatch_sync(move || rt2.is_current()), Some(true));
        assert_eq!(*seen.lock().unwrap(), (0..10).collect::<Vec<_>>());
        assert!(!rt.is_current());
    }

    #[test]
    fn nested_sync_dispatch_runs_inline() {
        let rt = Arc::new(RenderThread::spawn("test-render").unwrap());
        let inner = rt.clone();
        let result = rt.dispatch_sync(move || inner.dispatch_sync(|| 42));
        assert_eq!(result, Some(Some(42)));
    }

    #[test]
    fn stopped_thread_refuses_work() {
        let rt = RenderThread::spawn("test-render").unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        rt.dispatch(move || {
            c.fetch_add(1, Ordering::SeqCst);
        });
        rt.stop();
        rt.stop();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(!rt.dispatch(|| {}));
        assert_eq!(rt.dispatch_sync(|| 1), None);
    }
}
