//! Completion accounting for shutting down many connections at once.

use super::connection::CompletionHandler;

use crate::user_thread::{Timer, UserThread};

use parking_lot::Mutex;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

/// Counts completed shutdowns and fires the completion handler once, either when all of them
/// completed or when the timeout elapsed, whichever comes first.
pub struct ShutdownTracker {
    expected: usize,
    completed: AtomicUsize,
    handler: Mutex<Option<CompletionHandler>>,
    timer: Mutex<Option<Timer>>,
}

impl ShutdownTracker {
    pub fn new(expected: usize, handler: CompletionHandler) -> Arc<ShutdownTracker> {
        Arc::new(ShutdownTracker {
            expected,
            completed: AtomicUsize::new(0),
            handler: Mutex::new(Some(handler)),
            timer: Mutex::new(None),
        })
    }

    /// Arms the timeout. With nothing to wait for the handler is queued on the user thread
    /// right away.
    pub fn start(self: &Arc<Self>, user_thread: &UserThread, timeout: Duration) {
        if self.expected == 0 {
            let tracker = self.clone();
            user_thread.execute(move || tracker.fire());
            return;
        }
        if self.handler.lock().is_none() {
            return;
        }
        let tracker = self.clone();
        let timer = user_thread.run_after(timeout, move || {
            info!(
                "Timeout reached while shutting down, {} of {} connections completed",
                tracker.completed(),
                tracker.expected
            );
            tracker.fire();
        });
        *self.timer.lock() = Some(timer);
    }

    pub fn complete_one(&self) {
        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Shut down {} of {} connections", completed, self.expected);
        if completed == self.expected {
            self.fire();
        }
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }

    fn fire(&self) {
        let handler = self.handler.lock().take();
        if let Some(handler) = handler {
            if let Some(timer) = self.timer.lock().take() {
                timer.stop();
            }
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::sync::mpsc;

    fn counting() -> (CompletionHandler, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Box::new(move || tx.send(()).unwrap()), rx)
    }

    #[actix_rt::test]
    async fn test_fires_once_all_completed() {
        let user_thread = UserThread::start().unwrap();
        let (handler, mut fired) = counting();
        let tracker = ShutdownTracker::new(2, handler);
        tracker.start(&user_thread, Duration::from_millis(200));

        tracker.complete_one();
        assert!(fired.try_recv().is_err());
        tracker.complete_one();
        assert!(fired.try_recv().is_ok());

        // neither the timer nor late completions fire again
        tokio::time::sleep(Duration::from_millis(400)).await;
        tracker.complete_one();
        assert!(fired.try_recv().is_err());
    }

    #[actix_rt::test]
    async fn test_fires_on_timeout() {
        let user_thread = UserThread::start().unwrap();
        let (handler, mut fired) = counting();
        let tracker = ShutdownTracker::new(2, handler);
        tracker.start(&user_thread, Duration::from_millis(100));
        tracker.complete_one();

        tokio::time::timeout(Duration::from_secs(5), fired.recv()).await.unwrap().unwrap();
        assert_eq!(tracker.completed(), 1);
        tracker.complete_one();
        assert!(fired.try_recv().is_err());
    }

    #[actix_rt::test]
    async fn test_nothing_to_wait_for() {
        let user_thread = UserThread::start().unwrap();
        let caller = std::thread::current().id();
        let (tx, mut fired) = mpsc::unbounded_channel();
        let handler: CompletionHandler = Box::new(move || tx.send(std::thread::current().id()).unwrap());
        ShutdownTracker::new(0, handler).start(&user_thread, Duration::from_secs(60));

        let thread = tokio::time::timeout(Duration::from_secs(5), fired.recv()).await.unwrap().unwrap();
        assert_ne!(thread, caller);
        assert!(fired.try_recv().is_err());
    }

    #[actix_rt::test]
    async fn test_timeout_racing_last_completion_fires_once() {
        let user_thread = UserThread::start().unwrap();
        for _ in 0..20 {
            let (handler, mut fired) = counting();
            let tracker = ShutdownTracker::new(3, handler);
            tracker.start(&user_thread, Duration::from_millis(5));
            tracker.complete_one();
            tracker.complete_one();
            tokio::time::sleep(Duration::from_millis(5)).await;
            let last = tracker.clone();
            user_thread.execute(move || last.complete_one());

            tokio::time::timeout(Duration::from_secs(5), fired.recv()).await.unwrap().unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            assert!(fired.try_recv().is_err());
        }
    }
}
