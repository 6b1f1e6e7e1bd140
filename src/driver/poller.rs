use super::{dispatch::CommandError, session::TransportError, Inner};
use log::warn;
use std::{
    sync::{Arc, Condvar, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

/// Background status polling
///
/// Polls the controller's status on a fixed interval so the tracked state
/// stays fresh while the application isn't issuing commands of its own. The
/// poll goes through the same dispatcher and session mutex as foreground
/// commands, so it can never interleave with them on the wire; at worst a
/// foreground command waits one exchange for the lock.
///
/// Obtained from [`Controller::start_poller`][super::Controller::start_poller].
/// Failed polls are logged and skipped; a lost link stops the thread for
/// good. Dropping the poller (or calling [`stop`][Self::stop]) signals the
/// thread and joins it.
#[derive(Debug)]
pub struct StatusPoller {
    shutdown: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl StatusPoller {
    pub(super) fn spawn(inner: Arc<Inner>, interval: Duration) -> Self {
        let shutdown = Arc::new((Mutex::new(false), Condvar::new()));
        let flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || loop {
            match inner.poll_status() {
                Ok(_) => {}
                Err(CommandError::Transport(TransportError::LinkLost(e))) => {
                    warn!("status polling stopped, link lost: {}", e);
                    break;
                }
                Err(e) => warn!("status poll failed: {}", e),
            }
            let (lock, condvar) = &*flag;
            let stopped = condvar
                .wait_timeout_while(lock.lock().unwrap(), interval, |stop| !*stop)
                .unwrap()
                .0;
            if *stopped {
                break;
            }
        });
        StatusPoller {
            shutdown,
            handle: Some(handle),
        }
    }

    /// Signals the polling thread and waits for it to finish
    pub fn stop(mut self) {
        self.shutdown_and_join();
    }

    fn shutdown_and_join(&mut self) {
        let (lock, condvar) = &*self.shutdown;
        *lock.lock().unwrap() = true;
        condvar.notify_all();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        self.shutdown_and_join();
    }
}
