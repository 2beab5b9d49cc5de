//! The synchronization engine.
//!
//! A [`SyncManager`] reconciles a wallet's transaction set with the chain
//! through one of two backends, fixed at construction: a remote
//! transaction indexer (client mode) or a peer-to-peer manager (P2P mode).
//! Both variants feed the same [`SyncEvent`](crate::events::SyncEvent)
//! stream.

mod client;
mod p2p;
pub(crate) mod scan;

pub use client::ClientSyncManager;
pub use p2p::PeerSyncManager;

use std::{error, fmt, str::FromStr, sync};

use miniscript::bitcoin::{Amount, Transaction};

use crate::{
    chain::ChainParams,
    client::IndexerClient,
    events::EventSink,
    p2p::PeerManager,
    wallet::{BlockInfo, TxSummary, Wallet},
};

/// Confirmations needed before a send is trusted as a rescan floor.
pub const CONFIRMATION_BLOCK_COUNT: u64 = 6;
/// Expected block interval, in minutes.
pub const MINUTES_PER_BLOCK: u64 = 10;
/// How many days of blocks every catch-up round re-covers.
const SYNC_OVERLAP_DAYS: u64 = 1;
/// Window width, in blocks, above which a range query counts as a full
/// scan. One day worth of blocks.
pub const SYNC_START_BLOCK_OFFSET: u64 = SYNC_OVERLAP_DAYS * 24 * 60 / MINUTES_PER_BLOCK;
pub const ONE_WEEK_IN_SECONDS: u64 = 604_800;

/// Which backend a manager syncs through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// A remote transaction indexer queried over block windows.
    Client,
    /// A peer-to-peer manager talking to the network directly.
    P2p,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SyncMode::Client => write!(f, "client"),
            SyncMode::P2p => write!(f, "p2p"),
        }
    }
}

#[derive(Debug)]
pub struct ParseSyncModeError(String);

impl fmt::Display for ParseSyncModeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "unknown sync mode '{}', expected 'client' or 'p2p'",
            self.0
        )
    }
}

impl error::Error for ParseSyncModeError {}

impl FromStr for SyncMode {
    type Err = ParseSyncModeError;

    fn from_str(s: &str) -> Result<SyncMode, ParseSyncModeError> {
        match s {
            "client" => Ok(SyncMode::Client),
            "p2p" => Ok(SyncMode::P2p),
            _ => Err(ParseSyncModeError(s.to_string())),
        }
    }
}

/// How far back a rescan should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDepth {
    /// From the most recent outgoing transaction with enough
    /// confirmations. Everything before it is settled wallet history.
    FromLastConfirmedSend,
    /// From the last hardcoded checkpoint below the current chain height.
    FromLastTrustedBlock,
    /// From the wallet's creation point.
    FromCreation,
}

// The greatest block height among wallet transactions that sent funds, are
// valid, and are at least CONFIRMATION_BLOCK_COUNT deep at the given
// network height.
pub(crate) fn last_confirmed_send_height(
    txs: &[TxSummary],
    network_block_height: u64,
) -> Option<u64> {
    txs.iter()
        .filter(|tx| tx.is_valid && tx.amount_sent > Amount::ZERO)
        .filter_map(|tx| tx.block.map(|block| block.height))
        .filter(|height| height + CONFIRMATION_BLOCK_COUNT <= network_block_height + 1)
        .max()
}

/// A wallet synchronization manager.
///
/// Created once per wallet. The mode is fixed for the manager's lifetime;
/// switching modes means dropping the manager and building a new one. All
/// methods may be called from any thread; collaborator callbacks re-enter
/// through the `announce_*` methods in client mode and through the
/// registered [`PeerEvents`](crate::p2p::PeerEvents) handler in P2P mode.
pub enum SyncManager {
    Client(ClientSyncManager),
    P2p(PeerSyncManager),
}

impl SyncManager {
    /// A manager syncing through a remote transaction indexer.
    ///
    /// `earliest_key_time` (UNIX time) bounds how far back scans ever need
    /// to go; `block_height` is the host's last persisted chain height.
    pub fn for_client(
        params: sync::Arc<ChainParams>,
        wallet: sync::Arc<sync::Mutex<dyn Wallet>>,
        client: sync::Arc<dyn IndexerClient>,
        sink: sync::Arc<dyn EventSink>,
        earliest_key_time: u64,
        block_height: u64,
    ) -> SyncManager {
        SyncManager::Client(ClientSyncManager::new(
            params,
            wallet,
            client,
            sink,
            earliest_key_time,
            block_height,
        ))
    }

    /// A manager delegating sync to a peer-to-peer manager. The peer
    /// manager carries its own chain parameters.
    pub fn for_p2p(
        wallet: sync::Arc<sync::Mutex<dyn Wallet>>,
        peer: sync::Arc<dyn PeerManager>,
        sink: sync::Arc<dyn EventSink>,
        block_height: u64,
    ) -> SyncManager {
        SyncManager::P2p(PeerSyncManager::new(wallet, peer, sink, block_height))
    }

    pub fn mode(&self) -> SyncMode {
        match self {
            SyncManager::Client(_) => SyncMode::Client,
            SyncManager::P2p(_) => SyncMode::P2p,
        }
    }

    /// The best block height we know of.
    pub fn block_height(&self) -> u64 {
        match self {
            SyncManager::Client(manager) => manager.block_height(),
            SyncManager::P2p(manager) => manager.block_height(),
        }
    }

    /// Whether a full scan is in progress.
    pub fn full_scan_in_progress(&self) -> bool {
        match self {
            SyncManager::Client(manager) => manager.full_scan_in_progress(),
            SyncManager::P2p(manager) => manager.full_scan_in_progress(),
        }
    }

    pub fn connect(&self) {
        match self {
            SyncManager::Client(manager) => manager.connect(),
            SyncManager::P2p(manager) => manager.connect(),
        }
    }

    pub fn disconnect(&self) {
        match self {
            SyncManager::Client(manager) => manager.disconnect(),
            SyncManager::P2p(manager) => manager.disconnect(),
        }
    }

    /// Rescan the whole wallet history.
    pub fn scan(&self) {
        self.scan_to_depth(SyncDepth::FromCreation);
    }

    /// Rescan from the given depth's start point.
    pub fn scan_to_depth(&self, depth: SyncDepth) {
        match self {
            SyncManager::Client(manager) => manager.scan_to_depth(depth),
            SyncManager::P2p(manager) => manager.scan_to_depth(depth),
        }
    }

    /// Broadcast a wallet transaction. The verdict is reported as a
    /// `TxnSubmitted` event. The transaction itself stays caller-owned,
    /// the manager works on copies.
    pub fn submit(&self, tx: &Transaction) {
        match self {
            SyncManager::Client(manager) => manager.submit(tx.clone()),
            SyncManager::P2p(manager) => manager.submit(tx.clone()),
        }
    }

    /// Drive time-based progress. Meant to be called periodically, for
    /// instance by a [`Poller`](crate::poller::Poller).
    pub fn tick_tock(&self) {
        match self {
            SyncManager::Client(manager) => manager.tick_tock(),
            SyncManager::P2p(manager) => manager.tick_tock(),
        }
    }

    // The announce_* responses below only make sense in client mode. On a
    // P2P manager they are a legal race after a mode change at the owner
    // level, and ignored.

    /// Indexer response to a block height poll.
    pub fn announce_block_number(&self, request_id: u64, height: u64) {
        match self {
            SyncManager::Client(manager) => manager.announce_block_number(request_id, height),
            SyncManager::P2p(_) => {
                log::debug!("Ignoring block height announcement in P2P mode.")
            }
        }
    }

    /// One transaction returned by the current range query.
    pub fn announce_transaction(&self, request_id: u64, raw_tx: &[u8], block: Option<BlockInfo>) {
        match self {
            SyncManager::Client(manager) => {
                manager.announce_transaction(request_id, raw_tx, block)
            }
            SyncManager::P2p(_) => {
                log::debug!("Ignoring transaction announcement in P2P mode.")
            }
        }
    }

    /// End of the current range query.
    pub fn announce_transactions_done(&self, request_id: u64, success: bool) {
        match self {
            SyncManager::Client(manager) => {
                manager.announce_transactions_done(request_id, success)
            }
            SyncManager::P2p(_) => log::debug!("Ignoring scan completion in P2P mode."),
        }
    }

    /// Broadcast verdict for a submitted transaction.
    pub fn announce_transaction_submitted(&self, request_id: u64, error: i32) {
        match self {
            SyncManager::Client(manager) => {
                manager.announce_transaction_submitted(request_id, error)
            }
            SyncManager::P2p(_) => {
                log::debug!("Ignoring submission verdict in P2P mode.")
            }
        }
    }
}
