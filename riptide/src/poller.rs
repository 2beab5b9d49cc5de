//! Drive a sync manager on a timer.

use crate::sync::SyncManager;

use std::{
    sync::{mpsc, Arc},
    time,
};

#[derive(Debug, Clone)]
pub enum PollerMessage {
    Shutdown,
    /// Ask the poller to tick immediately, get notified through the passed
    /// channel once it's done.
    TickNow(mpsc::SyncSender<()>),
}

/// Periodically calls [`SyncManager::tick_tock`] so the manager makes
/// time-based progress without the host running its own timer.
pub struct Poller {
    manager: Arc<SyncManager>,
}

impl Poller {
    pub fn new(manager: Arc<SyncManager>) -> Poller {
        Poller { manager }
    }

    /// Tick continuously until told to shut down.
    ///
    /// Typically this runs for the whole duration of the program in a
    /// thread, with the main thread sending `Shutdown` when going down.
    pub fn run(&self, tick_interval: time::Duration, receiver: mpsc::Receiver<PollerMessage>) {
        let mut last_tick = None;

        loop {
            // How long to wait before the next tick.
            let time_before_tick = if let Some(last_tick) = last_tick {
                let since_tick = time::Instant::now().duration_since(last_tick);
                tick_interval.saturating_sub(since_tick)
            } else {
                // Don't wait before doing the first tick.
                time::Duration::ZERO
            };

            // Wait out the interval, but listen to messages in the
            // meantime.
            match receiver.recv_timeout(time_before_tick) {
                Ok(PollerMessage::Shutdown) => {
                    log::info!("Sync poller was told to shut down.");
                    return;
                }
                Ok(PollerMessage::TickNow(sender)) => {
                    // We've been asked to tick, don't wait any further and
                    // signal completion to the caller.
                    last_tick = Some(time::Instant::now());
                    self.manager.tick_tock();
                    if let Err(e) = sender.send(()) {
                        log::error!("Error sending immediate tick completion signal: {}.", e);
                    }
                    continue;
                }
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    // It's been long enough since the last tick.
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    log::error!("Sync poller communication channel got disconnected. Exiting.");
                    return;
                }
            }
            last_tick = Some(time::Instant::now());

            self.manager.tick_tock();
        }
    }
}
