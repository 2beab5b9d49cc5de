//! P2P-mode synchronization.
//!
//! A thin adapter over the peer manager: its callbacks, arriving on its
//! own threads, are translated one to one into the unified event stream.
//! The adapter only tracks connection state, full-scan state and the best
//! known block height; everything else is the peer manager's business.

use std::sync::{Arc, Mutex};

use miniscript::bitcoin::Transaction;

use crate::{
    events::{self, EventSink, SyncEvent, STOP_REASON_ABORTED},
    p2p::{PeerEvents, PeerManager, PeerStatus, StoredBlock, StoredPeer},
    sync::{last_confirmed_send_height, SyncDepth},
    wallet::Wallet,
};

struct PeerState {
    // Only ever advanced.
    network_block_height: u64,
    is_connected: bool,
    is_full_scan: bool,
}

// State shared between the manager handle and the callback handler
// registered on the peer manager.
struct PeerShared {
    wallet: Arc<Mutex<dyn Wallet>>,
    peer: Arc<dyn PeerManager>,
    sink: Arc<dyn EventSink>,
    state: Mutex<PeerState>,
}

impl PeerShared {
    fn emit(&self, event: SyncEvent) {
        events::dispatch(self.sink.as_ref(), event);
    }
}

/// Synchronizes the wallet through a peer-to-peer manager.
pub struct PeerSyncManager {
    shared: Arc<PeerShared>,
}

impl PeerSyncManager {
    pub(crate) fn new(
        wallet: Arc<Mutex<dyn Wallet>>,
        peer: Arc<dyn PeerManager>,
        sink: Arc<dyn EventSink>,
        block_height: u64,
    ) -> PeerSyncManager {
        let shared = Arc::new(PeerShared {
            wallet,
            peer: peer.clone(),
            sink,
            state: Mutex::new(PeerState {
                network_block_height: block_height,
                is_connected: false,
                is_full_scan: false,
            }),
        });
        peer.register(shared.clone() as Arc<dyn PeerEvents>);
        PeerSyncManager { shared }
    }

    /// The best block height we know of.
    pub fn block_height(&self) -> u64 {
        self.shared.state.lock().unwrap().network_block_height
    }

    /// Whether a full scan is in progress.
    pub fn full_scan_in_progress(&self) -> bool {
        self.shared.state.lock().unwrap().is_full_scan
    }

    /// Ask the peer manager to connect. Connection and sync events arrive
    /// through its callbacks.
    pub fn connect(&self) {
        events::check_not_reentered();
        log::info!("Peer sync manager connecting.");
        self.shared.peer.connect();
    }

    pub fn disconnect(&self) {
        events::check_not_reentered();
        self.shared.peer.disconnect();
    }

    /// Rescan from the given depth's start point.
    pub fn scan_to_depth(&self, depth: SyncDepth) {
        events::check_not_reentered();
        match depth {
            SyncDepth::FromLastConfirmedSend => {
                let restart_height = {
                    let network_block_height =
                        self.shared.state.lock().unwrap().network_block_height;
                    let wallet = self.shared.wallet.lock().unwrap();
                    last_confirmed_send_height(&wallet.transactions(), network_block_height)
                };
                match restart_height {
                    Some(height) => {
                        log::info!("Rescanning from block height {}.", height);
                        self.shared.peer.rescan_from_height(height)
                    }
                    // Without a confirmed send to anchor on, start over.
                    None => self.shared.peer.rescan(),
                }
            }
            SyncDepth::FromLastTrustedBlock => self.shared.peer.rescan_from_last_checkpoint(),
            SyncDepth::FromCreation => self.shared.peer.rescan(),
        }
    }

    /// Broadcast a wallet transaction to the network. The verdict comes
    /// back asynchronously as a `TxnSubmitted` event.
    pub fn submit(&self, tx: Transaction) {
        events::check_not_reentered();
        let sink = self.shared.sink.clone();
        let reported = tx.clone();
        log::info!("Publishing transaction {}.", tx.compute_txid());
        // The peer manager hands the completion context back exactly once,
        // from one of its own threads.
        self.shared.peer.publish_transaction(
            tx,
            Box::new(move |error| {
                events::dispatch(
                    sink.as_ref(),
                    SyncEvent::TxnSubmitted {
                        tx: reported,
                        error,
                    },
                );
            }),
        );
    }

    /// Sample the peer manager's progress. During a full scan this emits a
    /// `SyncProgress` for values strictly between the endpoints.
    pub fn tick_tock(&self) {
        events::check_not_reentered();
        let percent = 100.0 * self.shared.peer.sync_progress(0);
        let timestamp = self.shared.peer.last_block_timestamp();

        let state = self.shared.state.lock().unwrap();
        if state.is_connected
            && state.is_full_scan
            && percent > 0.0
            && percent < 100.0
        {
            self.shared
                .emit(SyncEvent::SyncProgress { timestamp, percent });
        }
    }
}

impl PeerEvents for PeerShared {
    fn sync_started(&self) {
        events::check_not_reentered();
        let mut state = self.state.lock().unwrap();
        if !state.is_connected {
            state.is_connected = true;
            self.emit(SyncEvent::Connected);
        }
        if state.is_full_scan {
            // A new round pre-empted the previous one.
            self.emit(SyncEvent::SyncStopped {
                reason: STOP_REASON_ABORTED,
            });
        }
        state.is_full_scan = true;
        log::info!("Peer manager started syncing.");
        self.emit(SyncEvent::SyncStarted);
    }

    fn sync_stopped(&self, reason: i32) {
        events::check_not_reentered();
        // Peer manager queries are I/O, keep them out of the lock.
        let peer_disconnected = self.peer.status() == PeerStatus::Disconnected;

        let mut state = self.state.lock().unwrap();
        if state.is_full_scan {
            state.is_full_scan = false;
            self.emit(SyncEvent::SyncStopped { reason });
        }
        if state.is_connected && peer_disconnected {
            state.is_connected = false;
            log::info!("Peer manager disconnected.");
            self.emit(SyncEvent::Disconnected);
        }
    }

    fn tx_status_update(&self) {
        events::check_not_reentered();
        let height = self.peer.last_block_height();
        let peer_disconnected = self.peer.status() == PeerStatus::Disconnected;

        {
            let mut state = self.state.lock().unwrap();
            let advanced = height > state.network_block_height;
            if advanced {
                state.network_block_height = height;
            }
            if state.is_connected && peer_disconnected {
                if state.is_full_scan {
                    state.is_full_scan = false;
                    self.emit(SyncEvent::SyncStopped {
                        reason: STOP_REASON_ABORTED,
                    });
                }
                state.is_connected = false;
                self.emit(SyncEvent::Disconnected);
            }
            if advanced && state.is_connected {
                self.emit(SyncEvent::BlockHeightUpdated { height });
            }
        }

        self.emit(SyncEvent::TxnsUpdated);
    }

    fn save_blocks(&self, replace: bool, blocks: Vec<StoredBlock>) {
        self.emit(if replace {
            SyncEvent::SetBlocks { blocks }
        } else {
            SyncEvent::AddBlocks { blocks }
        });
    }

    fn save_peers(&self, replace: bool, peers: Vec<StoredPeer>) {
        self.emit(if replace {
            SyncEvent::SetPeers { peers }
        } else {
            SyncEvent::AddPeers { peers }
        });
    }

    fn network_is_reachable(&self) -> bool {
        // The host answers this for real through its own peer manager
        // integration.
        true
    }

    fn thread_cleanup(&self) {}
}
