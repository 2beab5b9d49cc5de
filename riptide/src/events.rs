//! Lifecycle events emitted by the sync engine.
//!
//! Both sync modes funnel their observable behavior into the same event
//! stream. Events that reflect a state transition of the manager
//! (connection, scan lifecycle, block height, progress) are handed to the
//! sink while the manager lock is held, so their order is a linearization
//! of the manager's state changes. The remaining events carry data for the
//! host and are dispatched without the lock.

use crate::p2p::{StoredBlock, StoredPeer};

use miniscript::bitcoin::Transaction;

/// `SyncStopped` reason for a round that completed.
pub const STOP_REASON_COMPLETE: i32 = 0;
/// `SyncStopped` reason for a round that was aborted or failed.
pub const STOP_REASON_ABORTED: i32 = -1;

/// What a sync manager tells its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The manager is now connected to its backend.
    Connected,
    /// The manager is now disconnected from its backend.
    Disconnected,
    /// A full scan of a block range began. Balanced by exactly one
    /// `SyncStopped` unless the manager is dropped first.
    SyncStarted,
    /// The scan that `SyncStarted` announced is over. A zero reason means
    /// it completed, anything else is a backend error code.
    SyncStopped { reason: i32 },
    /// Progress of an ongoing full scan, strictly between 0 and 100. The
    /// endpoints are signalled by `SyncStarted` and `SyncStopped`
    /// respectively.
    SyncProgress { timestamp: u64, percent: f64 },
    /// The network's best block height advanced. Only emitted while
    /// connected, with a height strictly greater than the last one.
    BlockHeightUpdated { height: u64 },
    /// The wallet's transaction set may have changed.
    TxnsUpdated,
    /// A submitted transaction got a broadcast verdict. A zero error means
    /// it was accepted by the backend.
    TxnSubmitted { tx: Transaction, error: i32 },
    /// Replace the host's persisted block set with these.
    SetBlocks { blocks: Vec<StoredBlock> },
    /// Append these to the host's persisted block set.
    AddBlocks { blocks: Vec<StoredBlock> },
    /// Replace the host's persisted peer set with these.
    SetPeers { peers: Vec<StoredPeer> },
    /// Append these to the host's persisted peer set.
    AddPeers { peers: Vec<StoredPeer> },
}

/// Receiver for the manager's event stream.
///
/// Notifications for state transitions are delivered while the manager
/// holds its internal lock. An implementation must therefore never call
/// back into the manager from `on_event`, it would deadlock. Hand the
/// event off to another thread instead.
pub trait EventSink: Send + Sync {
    fn on_event(&self, event: SyncEvent);
}

#[cfg(debug_assertions)]
use std::cell::Cell;

#[cfg(debug_assertions)]
thread_local! {
    static IN_SINK: Cell<bool> = Cell::new(false);
}

// Deliver an event to the sink, tracking the delivery in debug builds so
// re-entering manager calls can be caught.
pub(crate) fn dispatch(sink: &dyn EventSink, event: SyncEvent) {
    #[cfg(debug_assertions)]
    IN_SINK.with(|flag| flag.set(true));
    sink.on_event(event);
    #[cfg(debug_assertions)]
    IN_SINK.with(|flag| flag.set(false));
}

// Entry-point check for the sink contract: a sink notification must not
// call back into the manager on the same thread.
pub(crate) fn check_not_reentered() {
    #[cfg(debug_assertions)]
    IN_SINK.with(|flag| {
        debug_assert!(
            !flag.get(),
            "event sink called back into the sync manager"
        )
    });
}
