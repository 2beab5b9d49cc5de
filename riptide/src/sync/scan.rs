//! State of an in-flight range query against the transaction indexer.

use std::collections::HashSet;

use miniscript::bitcoin::Address;

use crate::sync::SYNC_START_BLOCK_OFFSET;
use crate::wallet::{KeyChain, Wallet, GAP_LIMIT_EXTERNAL, GAP_LIMIT_INTERNAL};

/// Verdict on a successfully completed query round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScanOutcome {
    /// The first unused addresses did not move, the window is covered.
    Stable,
    /// Discovery moved the first unused addresses. The same window must be
    /// queried again with the widened address set.
    Extended,
}

/// A scan is one query of a block window for a snapshot of the wallet's
/// addresses. It stays alive across re-queries of the same window until the
/// address set stops growing, then the window counts as synced.
#[derive(Debug, Clone)]
pub(crate) struct ScanState {
    /// Quoted by every indexer callback belonging to this scan.
    pub request_id: u64,
    /// Addresses the indexer was asked about, native and legacy forms.
    pub known_addresses: HashSet<Address>,
    /// First unused receive address as of the last query.
    pub last_external: Option<Address>,
    /// First unused change address as of the last query.
    pub last_internal: Option<Address>,
    /// Half-open block window `[begin, end)` being queried.
    pub begin_block: u64,
    pub end_block: u64,
    /// Whether the window is wide enough to count as a full scan.
    pub is_full_scan: bool,
}

impl ScanState {
    /// Snapshot the wallet for a query of `[begin_block, end_block)`.
    ///
    /// Derives addresses up to the gap limits first, so the query covers
    /// every address the wallet could have been paid on within the window.
    pub fn begin(
        wallet: &mut dyn Wallet,
        request_id: u64,
        begin_block: u64,
        end_block: u64,
    ) -> ScanState {
        let last_external = first_unused(wallet, KeyChain::External);
        let last_internal = first_unused(wallet, KeyChain::Internal);

        ScanState {
            request_id,
            known_addresses: gather_addresses(wallet),
            last_external,
            last_internal,
            begin_block,
            end_block,
            is_full_scan: end_block - begin_block > SYNC_START_BLOCK_OFFSET,
        }
    }

    /// After a successful round, decide whether the scan is over.
    ///
    /// When a returned transaction paid a previously unused address, the
    /// first unused address of its chain moves and newly derived addresses
    /// may hold transactions within the very window just queried. Absorb
    /// them and report that the window must be re-queried.
    pub fn on_round_complete(&mut self, wallet: &mut dyn Wallet) -> ScanOutcome {
        let external = first_unused(wallet, KeyChain::External);
        let internal = first_unused(wallet, KeyChain::Internal);

        if external == self.last_external && internal == self.last_internal {
            return ScanOutcome::Stable;
        }

        self.last_external = external;
        self.last_internal = internal;
        // The wallet's set only ever grows, so this is a superset of what
        // was queried before.
        self.known_addresses = gather_addresses(wallet);
        ScanOutcome::Extended
    }
}

// Derives up to the chain's gap limit as a side effect.
fn first_unused(wallet: &mut dyn Wallet, keychain: KeyChain) -> Option<Address> {
    let gap_limit = match keychain {
        KeyChain::External => GAP_LIMIT_EXTERNAL,
        KeyChain::Internal => GAP_LIMIT_INTERNAL,
    };
    wallet.unused_addresses(keychain, gap_limit).into_iter().next()
}

fn gather_addresses(wallet: &dyn Wallet) -> HashSet<Address> {
    let mut addresses = wallet.all_addresses();
    addresses.extend(wallet.legacy_addresses());
    addresses
}
