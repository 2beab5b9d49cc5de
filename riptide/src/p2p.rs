//! Interface to the peer-to-peer manager backing P2P-mode sync.

use std::net::SocketAddr;
use std::sync::Arc;

use miniscript::bitcoin::Transaction;

/// Connection state of the peer manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerStatus {
    Disconnected,
    Connecting,
    Connected,
}

/// A serialized block the host should persist for the next startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlock {
    pub height: u64,
    pub raw: Vec<u8>,
}

/// A known good peer the host should persist for the next startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoredPeer {
    pub addr: SocketAddr,
    /// Service flags advertised by the peer.
    pub services: u64,
    /// When the peer was last seen, UNIX time.
    pub timestamp: u64,
}

/// Callbacks a peer manager invokes from its own threads as the network
/// talks to it. Installed once through [`PeerManager::register`].
pub trait PeerEvents: Send + Sync {
    /// Header or block download from a peer began.
    fn sync_started(&self);

    /// Download stopped. A zero reason means it completed.
    fn sync_stopped(&self, reason: i32);

    /// A peer relayed something that may affect wallet transactions or the
    /// chain height.
    fn tx_status_update(&self);

    /// Blocks to persist. `replace` means drop what was stored before.
    fn save_blocks(&self, replace: bool, blocks: Vec<StoredBlock>);

    /// Peers to persist. `replace` means drop what was stored before.
    fn save_peers(&self, replace: bool, peers: Vec<StoredPeer>);

    /// Whether the host believes the network is reachable at all.
    fn network_is_reachable(&self) -> bool;

    /// A peer thread is about to exit.
    fn thread_cleanup(&self);
}

/// Our P2P backend.
pub trait PeerManager: Send + Sync {
    /// Install the handler receiving the manager's callbacks. Called once
    /// before `connect`.
    fn register(&self, handler: Arc<dyn PeerEvents>);

    fn connect(&self);

    fn disconnect(&self);

    /// Redownload everything since the wallet's creation point.
    fn rescan(&self);

    /// Redownload everything from this block height on.
    fn rescan_from_height(&self, height: u64);

    /// Redownload everything since the last hardcoded checkpoint.
    fn rescan_from_last_checkpoint(&self);

    /// Broadcast this transaction to the network. Ownership of `tx` moves
    /// to the peer manager; `on_done` is invoked exactly once with zero on
    /// acceptance or an error code otherwise.
    fn publish_transaction(&self, tx: Transaction, on_done: Box<dyn FnOnce(i32) + Send>);

    /// Best block height known to the connected peers.
    fn last_block_height(&self) -> u64;

    /// Timestamp of the best known block, UNIX time.
    fn last_block_timestamp(&self) -> u64;

    /// Estimated progress in `[0, 1]` of the ongoing sync. A zero
    /// `start_height` means "from wherever the current sync started".
    fn sync_progress(&self, start_height: u64) -> f64;

    fn status(&self) -> PeerStatus;
}
