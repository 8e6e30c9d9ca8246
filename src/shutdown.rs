//! Coordinated shutdown of the server's tasks.
//!
//! Every long running task gets a [`ShutdownHandle`]. Triggering (from any
//! handle, or from [`Shutdown`]) wakes all of them, and
//! [`Shutdown::wait_for_completion`] returns once every handle has been dropped.

use tokio::sync::{broadcast, mpsc};

use crate::misc::Take;

pub mod util;

#[derive(Debug)]
pub struct ShutdownHandle {
    // only held so that `wait_for_completion` can see this handle is alive
    _alive: mpsc::Sender<()>,
    listener: broadcast::Receiver<()>,
    trigger: broadcast::Sender<()>,
}

impl ShutdownHandle {
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.listener.recv().await;
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.trigger.send(());
    }
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        Self {
            _alive: self._alive.clone(),
            listener: self.trigger.subscribe(),
            trigger: self.trigger.clone(),
        }
    }
}

pub struct Shutdown {
    alive: Take<mpsc::Sender<()>>,
    done: mpsc::Receiver<()>,
    trigger: broadcast::Sender<()>,
}

impl Shutdown {
    pub fn new() -> Self {
        let (alive, done) = mpsc::channel(1);
        let (trigger, _) = broadcast::channel(1);
        Self {
            alive: Take::new(alive),
            done,
            trigger,
        }
    }

    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            _alive: self.alive.clone(),
            listener: self.trigger.subscribe(),
            trigger: self.trigger.clone(),
        }
    }

    /// must be called at most once
    pub async fn wait_for_completion(&mut self) {
        drop(self.alive.take());
        // resolves with `None` once all senders (handles) are gone
        self.done.recv().await;
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.trigger.send(());
    }
}
