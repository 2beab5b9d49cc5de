use crate::{
    chain::{ChainParams, Checkpoint},
    client::{IndexerClient, RequestId},
    events::{EventSink, SyncEvent},
    p2p::{PeerEvents, PeerManager, PeerStatus},
    sync::ONE_WEEK_IN_SECONDS,
    wallet::{BlockInfo, KeyChain, TxSummary, Wallet},
};

use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
};

use miniscript::bitcoin::{
    absolute, hashes::Hash, transaction, Address, Amount, Network, OutPoint, PubkeyHash,
    ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, WPubkeyHash, Witness,
};

/// Chain parameters anchoring a checkpoint of height 100 right before the
/// test wallets' padded key time.
pub fn test_params() -> Arc<ChainParams> {
    Arc::new(ChainParams::new(
        Network::Bitcoin,
        vec![
            Checkpoint {
                height: 0,
                timestamp: 500_000,
            },
            Checkpoint {
                height: 100,
                timestamp: 1_000_000,
            },
        ],
    ))
}

pub const TEST_KEY_TIME: u64 = 1_000_000 + ONE_WEEK_IN_SECONDS + 1;

/// A distinct but reproducible transaction.
pub fn dummy_tx(lock_time: u32) -> Transaction {
    Transaction {
        version: transaction::Version::TWO,
        lock_time: absolute::LockTime::from_consensus(lock_time),
        input: vec![TxIn {
            previous_output: OutPoint::null(),
            script_sig: ScriptBuf::new(),
            sequence: Sequence::MAX,
            witness: Witness::new(),
        }],
        output: vec![TxOut {
            value: Amount::from_sat(1_000),
            script_pubkey: ScriptBuf::new(),
        }],
    }
}

fn test_address(keychain: KeyChain, index: usize, legacy: bool) -> Address {
    let mut hash = [0u8; 20];
    hash[0] = match keychain {
        KeyChain::External => 0,
        KeyChain::Internal => 1,
    };
    hash[1..9].copy_from_slice(&(index as u64).to_le_bytes());
    let script = if legacy {
        ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array(hash))
    } else {
        ScriptBuf::new_p2wpkh(&WPubkeyHash::from_byte_array(hash))
    };
    Address::from_script(&script, Network::Bitcoin).expect("standard script")
}

/// An in-memory wallet with sequentially derived addresses per chain.
pub struct DummyWallet {
    derived_external: usize,
    derived_internal: usize,
    used_external: usize,
    used_internal: usize,
    txs: HashMap<Txid, Transaction>,
    summaries: Vec<TxSummary>,
    registered: usize,
    updated: usize,
}

impl DummyWallet {
    pub fn new() -> DummyWallet {
        DummyWallet {
            derived_external: 0,
            derived_internal: 0,
            used_external: 0,
            used_internal: 0,
            txs: HashMap::new(),
            summaries: Vec::new(),
            registered: 0,
            updated: 0,
        }
    }

    /// Pretend a payment landed on the first unused receive address.
    pub fn mark_external_used(&mut self) {
        self.used_external += 1;
    }

    /// Record a transaction summary without going through registration.
    pub fn insert_summary(&mut self, summary: TxSummary) {
        self.summaries.push(summary);
    }

    pub fn registered_count(&self) -> usize {
        self.registered
    }

    pub fn updated_count(&self) -> usize {
        self.updated
    }
}

impl Wallet for DummyWallet {
    fn all_addresses(&self) -> HashSet<Address> {
        let external =
            (0..self.derived_external).map(|i| test_address(KeyChain::External, i, false));
        let internal =
            (0..self.derived_internal).map(|i| test_address(KeyChain::Internal, i, false));
        external.chain(internal).collect()
    }

    fn legacy_addresses(&self) -> HashSet<Address> {
        let external =
            (0..self.derived_external).map(|i| test_address(KeyChain::External, i, true));
        let internal =
            (0..self.derived_internal).map(|i| test_address(KeyChain::Internal, i, true));
        external.chain(internal).collect()
    }

    fn unused_addresses(&mut self, keychain: KeyChain, gap_limit: u32) -> Vec<Address> {
        let used = match keychain {
            KeyChain::External => self.used_external,
            KeyChain::Internal => self.used_internal,
        };
        let needed = used + gap_limit as usize;
        match keychain {
            KeyChain::External => {
                self.derived_external = self.derived_external.max(needed);
            }
            KeyChain::Internal => {
                self.derived_internal = self.derived_internal.max(needed);
            }
        }
        (used..needed)
            .map(|i| test_address(keychain, i, false))
            .collect()
    }

    fn contains_transaction(&self, txid: &Txid) -> bool {
        self.txs.contains_key(txid)
    }

    fn register_transaction(&mut self, tx: Transaction, block: Option<BlockInfo>) {
        let txid = tx.compute_txid();
        if self.txs.insert(txid, tx).is_none() {
            self.registered += 1;
            self.summaries.push(TxSummary {
                txid,
                block,
                amount_sent: Amount::ZERO,
                is_valid: true,
            });
        }
    }

    fn update_transaction(&mut self, txid: &Txid, block: Option<BlockInfo>) {
        self.updated += 1;
        if let Some(summary) = self.summaries.iter_mut().find(|s| s.txid == *txid) {
            summary.block = block;
        }
    }

    fn transactions(&self) -> Vec<TxSummary> {
        self.summaries.clone()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClientCall {
    GetBlockNumber {
        request_id: RequestId,
    },
    GetTransactions {
        addresses: HashSet<Address>,
        begin: u64,
        end: u64,
        request_id: RequestId,
    },
    SubmitTransaction {
        txid: Txid,
        request_id: RequestId,
    },
}

/// Records the calls a client-mode manager makes.
pub struct DummyClient {
    calls: Mutex<Vec<ClientCall>>,
}

impl DummyClient {
    pub fn new() -> DummyClient {
        DummyClient {
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ClientCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl IndexerClient for DummyClient {
    fn get_block_number(&self, request_id: RequestId) {
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::GetBlockNumber { request_id });
    }

    fn get_transactions(
        &self,
        addresses: &HashSet<Address>,
        begin: u64,
        end: u64,
        request_id: RequestId,
    ) {
        self.calls.lock().unwrap().push(ClientCall::GetTransactions {
            addresses: addresses.clone(),
            begin,
            end,
            request_id,
        });
    }

    fn submit_transaction(&self, _raw_tx: Vec<u8>, txid: Txid, request_id: RequestId) {
        self.calls
            .lock()
            .unwrap()
            .push(ClientCall::SubmitTransaction { txid, request_id });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    Connect,
    Disconnect,
    Rescan,
    RescanFromHeight { height: u64 },
    RescanFromLastCheckpoint,
    Publish { txid: Txid },
}

/// A scriptable peer manager recording the calls it receives. Publishes
/// complete synchronously with the configured error.
pub struct DummyPeerManager {
    handler: Mutex<Option<Arc<dyn PeerEvents>>>,
    status: Mutex<PeerStatus>,
    height: Mutex<u64>,
    timestamp: Mutex<u64>,
    progress: Mutex<f64>,
    publish_error: Mutex<i32>,
    calls: Mutex<Vec<PeerCall>>,
}

impl DummyPeerManager {
    pub fn new() -> DummyPeerManager {
        DummyPeerManager {
            handler: Mutex::new(None),
            status: Mutex::new(PeerStatus::Connected),
            height: Mutex::new(0),
            timestamp: Mutex::new(0),
            progress: Mutex::new(0.0),
            publish_error: Mutex::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn handler(&self) -> Option<Arc<dyn PeerEvents>> {
        self.handler.lock().unwrap().clone()
    }

    pub fn set_status(&self, status: PeerStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn set_height(&self, height: u64) {
        *self.height.lock().unwrap() = height;
    }

    pub fn set_timestamp(&self, timestamp: u64) {
        *self.timestamp.lock().unwrap() = timestamp;
    }

    pub fn set_progress(&self, progress: f64) {
        *self.progress.lock().unwrap() = progress;
    }

    pub fn set_publish_error(&self, error: i32) {
        *self.publish_error.lock().unwrap() = error;
    }

    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap().clone()
    }
}

impl PeerManager for DummyPeerManager {
    fn register(&self, handler: Arc<dyn PeerEvents>) {
        *self.handler.lock().unwrap() = Some(handler);
    }

    fn connect(&self) {
        self.calls.lock().unwrap().push(PeerCall::Connect);
    }

    fn disconnect(&self) {
        self.calls.lock().unwrap().push(PeerCall::Disconnect);
    }

    fn rescan(&self) {
        self.calls.lock().unwrap().push(PeerCall::Rescan);
    }

    fn rescan_from_height(&self, height: u64) {
        self.calls
            .lock()
            .unwrap()
            .push(PeerCall::RescanFromHeight { height });
    }

    fn rescan_from_last_checkpoint(&self) {
        self.calls
            .lock()
            .unwrap()
            .push(PeerCall::RescanFromLastCheckpoint);
    }

    fn publish_transaction(&self, tx: Transaction, on_done: Box<dyn FnOnce(i32) + Send>) {
        self.calls.lock().unwrap().push(PeerCall::Publish {
            txid: tx.compute_txid(),
        });
        on_done(*self.publish_error.lock().unwrap());
    }

    fn last_block_height(&self) -> u64 {
        *self.height.lock().unwrap()
    }

    fn last_block_timestamp(&self) -> u64 {
        *self.timestamp.lock().unwrap()
    }

    fn sync_progress(&self, _start_height: u64) -> f64 {
        *self.progress.lock().unwrap()
    }

    fn status(&self) -> PeerStatus {
        *self.status.lock().unwrap()
    }
}

/// Collects the event stream for later assertions.
pub struct RecordingSink {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingSink {
    pub fn new() -> RecordingSink {
        RecordingSink {
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl EventSink for RecordingSink {
    fn on_event(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Connected and Disconnected must alternate, starting from disconnected.
pub fn assert_connection_alternates(events: &[SyncEvent]) {
    let mut connected = false;
    for event in events {
        match event {
            SyncEvent::Connected => {
                assert!(!connected, "Connected while connected: {:?}", events);
                connected = true;
            }
            SyncEvent::Disconnected => {
                assert!(connected, "Disconnected while disconnected: {:?}", events);
                connected = false;
            }
            _ => {}
        }
    }
}

/// Each SyncStarted must be balanced by exactly one SyncStopped before the
/// next SyncStarted.
pub fn assert_sync_pairs_balanced(events: &[SyncEvent]) {
    let mut scanning = false;
    for event in events {
        match event {
            SyncEvent::SyncStarted => {
                assert!(!scanning, "SyncStarted while scanning: {:?}", events);
                scanning = true;
            }
            SyncEvent::SyncStopped { .. } => {
                assert!(scanning, "unbalanced SyncStopped: {:?}", events);
                scanning = false;
            }
            _ => {}
        }
    }
}
