//! The single logical thread on which every listener callback runs.
//!
//! Message delivery and connection lifecycle notifications are never executed on a read or
//! write task. They are queued here and run one after another, so listeners observe events
//! of a connection in the order they happened.

use crate::{Error, Result};

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;

use futures::Future;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tracing::{error, trace};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Clone)]
pub struct UserThread {
    jobs: mpsc::UnboundedSender<Job>,
    handle: Handle,
}

impl UserThread {
    /// Starts the callback thread. Must be called from within a tokio runtime, whose handle
    /// is used for timers and for spawning tasks from callbacks.
    pub fn start() -> Result<UserThread> {
        let handle = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let (jobs, mut receiver) = mpsc::unbounded_channel::<Job>();
        thread::Builder::new().name("user-thread".to_string()).spawn(move || {
            while let Some(job) = receiver.blocking_recv() {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(job)) {
                    error!("callback panicked: {:?}", panic_message(&*panic));
                }
            }
            trace!("user thread stopped");
        })?;
        Ok(UserThread { jobs, handle })
    }

    /// Queues `f` to run on the callback thread.
    pub fn execute<F: FnOnce() + Send + 'static>(&self, f: F) {
        if self.jobs.send(Box::new(f)).is_err() {
            error!("user thread is gone, dropping callback");
        }
    }

    /// Runs `f` on the callback thread after `delay`, unless the returned timer is stopped first.
    pub fn run_after<F: FnOnce() + Send + 'static>(&self, delay: Duration, f: F) -> Timer {
        let user_thread = self.clone();
        let task = self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            user_thread.execute(f);
        });
        Timer { task }
    }

    /// Spawns a future on the runtime this thread was started from.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn handle(&self) -> &Handle {
        &self.handle
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// A pending `run_after` callback.
pub struct Timer {
    task: JoinHandle<()>,
}

impl Timer {
    pub fn stop(&self) {
        self.task.abort();
    }
}
