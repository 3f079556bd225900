use std::{
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct Running {
    tag: Option<u64>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Running {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.handle.is_finished()
    }
}

#[derive(Debug, Default)]
struct Slot {
    running: Option<Running>,
    closed: bool,
}

/// Holds at most one instance of a cooperatively cancellable background task.
///
/// The spawned future receives a [`CancellationToken`] and must return once it
/// is cancelled. A closed slot refuses to spawn until it is opened again.
#[derive(Debug)]
pub struct BackgroundTask {
    name: &'static str,
    slot: Mutex<Slot>,
}

impl BackgroundTask {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slot: Mutex::new(Slot::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns the task unless an instance is already active.
    ///
    /// A cancelled instance that is still winding down is awaited first.
    /// Returns true if a new instance was spawned.
    pub async fn ensure_running<F, Fut>(&self, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tagged(None, start).await
    }

    /// Like [`ensure_running`](Self::ensure_running), but an active instance
    /// started for a different `tag` is stopped and replaced.
    pub async fn ensure_running_for<F, Fut>(&self, tag: u64, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.spawn_tagged(Some(tag), start).await
    }

    async fn spawn_tagged<F, Fut>(&self, tag: Option<u64>, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        loop {
            let previous = {
                let mut slot = self.lock();
                if slot.closed {
                    log::trace!("[{}] closed, not starting", self.name);
                    return false;
                }
                match slot.running.take() {
                    Some(running) if running.is_active() && running.tag == tag => {
                        log::debug!("[{}] already running, ignoring start request", self.name);
                        slot.running = Some(running);
                        return false;
                    }
                    Some(running) if running.is_active() => {
                        log::debug!(
                            "[{}] replacing instance for {:?} with {:?}",
                            self.name,
                            running.tag,
                            tag
                        );
                        running.cancel.cancel();
                        running
                    }
                    Some(running) if !running.handle.is_finished() => running,
                    _ => {
                        let cancel = CancellationToken::new();
                        let handle = tokio::task::spawn(start(cancel.clone()));
                        slot.running = Some(Running {
                            tag,
                            cancel,
                            handle,
                        });
                        log::debug!("[{}] started", self.name);
                        return true;
                    }
                }
            };
            self.join(previous).await;
        }
    }

    /// Stops a running instance and spawns a fresh one.
    pub async fn restart<F, Fut>(&self, start: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop().await;
        self.ensure_running(start).await
    }

    /// Cancels the running instance and waits for it to complete.
    /// Returns true if there was an instance to stop.
    pub async fn stop(&self) -> bool {
        let running = self.lock().running.take();
        match running {
            Some(running) => {
                running.cancel.cancel();
                self.join(running).await;
                true
            }
            None => false,
        }
    }

    /// Stops the task and refuses further starts until [`open`](Self::open).
    pub async fn close(&self) -> bool {
        self.lock().closed = true;
        self.stop().await
    }

    pub fn open(&self) {
        self.lock().closed = false;
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .running
            .as_ref()
            .map(Running::is_active)
            .unwrap_or(false)
    }

    async fn join(&self, running: Running) {
        if let Err(err) = running.handle.await {
            if err.is_panic() {
                log::error!("[{}] background task panicked: {}", self.name, err);
            }
        }
        log::trace!("[{}] stopped", self.name);
    }
}

impl Drop for BackgroundTask {
    fn drop(&mut self) {
        if let Some(running) = self.lock().running.take() {
            running.cancel.cancel();
            running.handle.abort();
        }
    }
}
