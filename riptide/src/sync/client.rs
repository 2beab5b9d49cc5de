//! Client-mode synchronization.
//!
//! Discover the wallet's transactions by polling a remote indexer over a
//! block window, widening the queried address set whenever gap-limit
//! discovery surfaces new addresses. All mutable state lives behind one
//! lock; indexer responses re-enter through the `announce_*` methods from
//! whatever thread the client implementation uses.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use miniscript::bitcoin::{consensus, Transaction};

use crate::{
    chain::ChainParams,
    client::IndexerClient,
    events::{self, EventSink, SyncEvent, STOP_REASON_ABORTED, STOP_REASON_COMPLETE},
    sync::scan::{ScanOutcome, ScanState},
    sync::{last_confirmed_send_height, SyncDepth, ONE_WEEK_IN_SECONDS, SYNC_START_BLOCK_OFFSET},
    wallet::{BlockInfo, Wallet},
};

struct ClientState {
    // Fixed lower bound for every scan, from the checkpoint preceding the
    // wallet's earliest key time.
    init_block_height: u64,
    // Only ever advanced.
    network_block_height: u64,
    // Last block of confirmed coverage. Reset downward by rescans only.
    synced_block_height: u64,
    is_connected: bool,
    // Present iff a scan is in progress.
    scan: Option<ScanState>,
    // Last allocated request id, zero before the first allocation.
    last_request_id: u64,
    // Submitted transactions awaiting the indexer's broadcast verdict.
    pending_submits: HashMap<u64, Transaction>,
}

impl ClientState {
    fn next_request_id(&mut self) -> u64 {
        self.last_request_id += 1;
        self.last_request_id
    }
}

/// Synchronizes the wallet through a remote transaction indexer.
pub struct ClientSyncManager {
    params: Arc<ChainParams>,
    wallet: Arc<Mutex<dyn Wallet>>,
    client: Arc<dyn IndexerClient>,
    sink: Arc<dyn EventSink>,
    state: Mutex<ClientState>,
}

impl ClientSyncManager {
    pub(crate) fn new(
        params: Arc<ChainParams>,
        wallet: Arc<Mutex<dyn Wallet>>,
        client: Arc<dyn IndexerClient>,
        sink: Arc<dyn EventSink>,
        earliest_key_time: u64,
        block_height: u64,
    ) -> ClientSyncManager {
        // Pad the key time by a week to be safe against clock skew between
        // the wallet's creation device and the block timestamps.
        let init_block_height = params
            .checkpoint_before(earliest_key_time.saturating_sub(ONE_WEEK_IN_SECONDS))
            .map(|c| c.height)
            .unwrap_or(0);

        ClientSyncManager {
            params,
            wallet,
            client,
            sink,
            state: Mutex::new(ClientState {
                init_block_height,
                network_block_height: block_height.max(init_block_height),
                synced_block_height: init_block_height,
                is_connected: false,
                scan: None,
                last_request_id: 0,
                pending_submits: HashMap::new(),
            }),
        }
    }

    fn emit(&self, event: SyncEvent) {
        events::dispatch(self.sink.as_ref(), event);
    }

    /// The best block height we know of.
    pub fn block_height(&self) -> u64 {
        self.state.lock().unwrap().network_block_height
    }

    /// Whether a full scan is in progress.
    pub fn full_scan_in_progress(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .scan
            .as_ref()
            .map(|scan| scan.is_full_scan)
            .unwrap_or(false)
    }

    /// Mark the indexer as reachable and kick off a catch-up round. A no-op
    /// when already connected.
    pub fn connect(&self) {
        events::check_not_reentered();
        {
            let mut state = self.state.lock().unwrap();
            if state.is_connected {
                return;
            }
            state.is_connected = true;
            log::info!("Client sync manager connected.");
            self.emit(SyncEvent::Connected);
        }
        self.update_block_number();
        self.update_transactions();
    }

    /// Drop the connection, cancelling any scan in progress. A no-op when
    /// already disconnected.
    pub fn disconnect(&self) {
        events::check_not_reentered();
        let mut state = self.state.lock().unwrap();
        if !state.is_connected {
            return;
        }
        // Any in-flight scan is cancelled, its remaining callbacks are
        // stale from this point on.
        let was_full_scan = state
            .scan
            .take()
            .map(|scan| scan.is_full_scan)
            .unwrap_or(false);
        state.is_connected = false;
        log::info!("Client sync manager disconnected.");
        if was_full_scan {
            self.emit(SyncEvent::SyncStopped {
                reason: STOP_REASON_ABORTED,
            });
        }
        self.emit(SyncEvent::Disconnected);
    }

    /// Rescan from the given depth's start point.
    ///
    /// While connected this interrupts any scan in progress, signals the
    /// reset to the sink as a `Disconnected`/`Connected` pair, and starts
    /// over from the depth's height.
    pub fn scan_to_depth(&self, depth: SyncDepth) {
        events::check_not_reentered();
        {
            let mut state = self.state.lock().unwrap();

            let restart_height = match depth {
                SyncDepth::FromLastConfirmedSend => {
                    let wallet = self.wallet.lock().unwrap();
                    last_confirmed_send_height(
                        &wallet.transactions(),
                        state.network_block_height,
                    )
                    .unwrap_or(state.init_block_height)
                }
                SyncDepth::FromLastTrustedBlock => self
                    .params
                    .checkpoint_before_height(state.network_block_height)
                    .map(|c| c.height)
                    .unwrap_or(state.init_block_height),
                SyncDepth::FromCreation => state.init_block_height,
            };
            state.synced_block_height = restart_height.max(state.init_block_height);
            log::info!(
                "Rescanning from block height {}.",
                state.synced_block_height
            );

            if !state.is_connected {
                // The lowered start point will be picked up by the scan
                // following the next connection.
                return;
            }

            let was_full_scan = state
                .scan
                .take()
                .map(|scan| scan.is_full_scan)
                .unwrap_or(false);
            if was_full_scan {
                self.emit(SyncEvent::SyncStopped {
                    reason: STOP_REASON_ABORTED,
                });
            }
            self.emit(SyncEvent::Disconnected);
            self.emit(SyncEvent::Connected);
        }
        self.update_block_number();
        self.update_transactions();
    }

    /// Broadcast a wallet transaction through the indexer. While
    /// disconnected the verdict is an immediate failure.
    pub fn submit(&self, tx: Transaction) {
        events::check_not_reentered();
        let request_id = {
            let mut state = self.state.lock().unwrap();
            if !state.is_connected {
                drop(state);
                log::warn!("Transaction submitted while disconnected.");
                self.emit(SyncEvent::TxnSubmitted { tx, error: -1 });
                return;
            }
            let request_id = state.next_request_id();
            state.pending_submits.insert(request_id, tx.clone());
            request_id
        };
        let txid = tx.compute_txid();
        log::info!("Submitting transaction {} (request {}).", txid, request_id);
        self.client
            .submit_transaction(consensus::serialize(&tx), txid, request_id);
    }

    /// Drive time-based progress: refresh the network height and, if idle,
    /// start a catch-up scan.
    pub fn tick_tock(&self) {
        events::check_not_reentered();
        self.update_block_number();
        self.update_transactions();
    }

    fn update_block_number(&self) {
        let request_id = {
            let mut state = self.state.lock().unwrap();
            if !state.is_connected {
                return;
            }
            state.next_request_id()
        };
        self.client.get_block_number(request_id);
    }

    fn update_transactions(&self) {
        let (addresses, begin, end, request_id) = {
            let mut state = self.state.lock().unwrap();
            // One scan at a time.
            if !state.is_connected || state.scan.is_some() {
                return;
            }

            // Query up to the best known block, and always re-cover at
            // least the trailing day in case of short reorgs or late
            // confirmations.
            let end = state
                .synced_block_height
                .max(state.network_block_height)
                + 1;
            let begin = state
                .synced_block_height
                .min(end.saturating_sub(SYNC_START_BLOCK_OFFSET));

            let request_id = state.next_request_id();
            let scan = {
                let mut wallet = self.wallet.lock().unwrap();
                ScanState::begin(&mut *wallet, request_id, begin, end)
            };
            let addresses = scan.known_addresses.clone();
            if scan.is_full_scan {
                self.emit(SyncEvent::SyncStarted);
            }
            log::debug!(
                "Querying blocks [{}, {}) over {} addresses (request {}).",
                begin,
                end,
                addresses.len(),
                request_id
            );
            state.scan = Some(scan);
            (addresses, begin, end, request_id)
        };
        self.client
            .get_transactions(&addresses, begin, end, request_id);
    }

    /// Indexer response to a block height poll. Heights that do not
    /// advance our knowledge are dropped, as is anything received while
    /// disconnected.
    pub fn announce_block_number(&self, request_id: u64, height: u64) {
        events::check_not_reentered();
        let mut state = self.state.lock().unwrap();
        if !state.is_connected {
            log::debug!(
                "Dropping block height announcement while disconnected (request {}).",
                request_id
            );
            return;
        }
        if height <= state.network_block_height {
            return;
        }
        state.network_block_height = height;
        self.emit(SyncEvent::BlockHeightUpdated { height });
    }

    /// One transaction returned by the current range query.
    pub fn announce_transaction(
        &self,
        request_id: u64,
        raw_tx: &[u8],
        block: Option<BlockInfo>,
    ) {
        events::check_not_reentered();
        let tx: Transaction = match consensus::deserialize(raw_tx) {
            Ok(tx) => tx,
            Err(e) => {
                log::warn!("Indexer returned an undecodable transaction: '{}'.", e);
                return;
            }
        };

        let state = self.state.lock().unwrap();
        if !state.is_connected
            || state.scan.as_ref().map(|scan| scan.request_id) != Some(request_id)
        {
            log::debug!(
                "Dropping stale transaction announcement (request {}).",
                request_id
            );
            return;
        }

        let txid = tx.compute_txid();
        let mut wallet = self.wallet.lock().unwrap();
        if wallet.contains_transaction(&txid) {
            wallet.update_transaction(&txid, block);
        } else {
            log::debug!("Discovered transaction {}.", txid);
            wallet.register_transaction(tx, block);
        }
    }

    /// End of the current range query.
    ///
    /// On success, the window is re-queried with a widened address set for
    /// as long as gap-limit discovery keeps moving the first unused
    /// addresses; once they are stable the window counts as synced.
    pub fn announce_transactions_done(&self, request_id: u64, success: bool) {
        events::check_not_reentered();
        let mut state = self.state.lock().unwrap();
        if !state.is_connected {
            log::debug!(
                "Dropping scan completion while disconnected (request {}).",
                request_id
            );
            return;
        }
        let mut scan = match state.scan.take() {
            Some(scan) if scan.request_id == request_id => scan,
            other => {
                // Not the scan we are waiting on.
                state.scan = other;
                log::debug!("Dropping stale scan completion (request {}).", request_id);
                return;
            }
        };

        if !success {
            log::warn!(
                "Indexer failed querying blocks [{}, {}).",
                scan.begin_block,
                scan.end_block
            );
            if scan.is_full_scan {
                self.emit(SyncEvent::SyncStopped {
                    reason: STOP_REASON_ABORTED,
                });
            }
            return;
        }

        let outcome = {
            let mut wallet = self.wallet.lock().unwrap();
            scan.on_round_complete(&mut *wallet)
        };
        match outcome {
            ScanOutcome::Extended => {
                let addresses = scan.known_addresses.clone();
                let (begin, end) = (scan.begin_block, scan.end_block);
                log::debug!(
                    "Discovery widened the address set to {}, re-querying blocks [{}, {}).",
                    addresses.len(),
                    begin,
                    end
                );
                state.scan = Some(scan);
                drop(state);
                self.client
                    .get_transactions(&addresses, begin, end, request_id);
            }
            ScanOutcome::Stable => {
                state.synced_block_height = scan.end_block - 1;
                log::debug!(
                    "Caught up with the chain at height {}.",
                    state.synced_block_height
                );
                if scan.is_full_scan {
                    self.emit(SyncEvent::SyncStopped {
                        reason: STOP_REASON_COMPLETE,
                    });
                }
            }
        }
    }

    /// Broadcast verdict for a submitted transaction. Verdicts for unknown
    /// request ids are dropped.
    pub fn announce_transaction_submitted(&self, request_id: u64, error: i32) {
        events::check_not_reentered();
        let tx = self
            .state
            .lock()
            .unwrap()
            .pending_submits
            .remove(&request_id);
        match tx {
            Some(tx) => self.emit(SyncEvent::TxnSubmitted { tx, error }),
            None => log::debug!(
                "Dropping verdict for unknown submission (request {}).",
                request_id
            ),
        }
    }
}
