//! Chain parameters: the trusted checkpoints bounding scans and rescans.

use std::fmt;

use miniscript::bitcoin::Network;

/// A trusted (height, time) anchor in the block chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checkpoint {
    pub height: u64,
    /// Header timestamp of the checkpointed block.
    pub timestamp: u64,
}

impl fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({},{})", self.height, self.timestamp)
    }
}

/// Parameters of the chain a wallet lives on.
#[derive(Debug, Clone)]
pub struct ChainParams {
    pub network: Network,
    // Ascending by height. The first entry anchors the genesis block.
    checkpoints: Vec<Checkpoint>,
}

impl ChainParams {
    /// Parameters with a custom checkpoint table.
    pub fn new(network: Network, mut checkpoints: Vec<Checkpoint>) -> ChainParams {
        checkpoints.sort_by_key(|c| c.height);
        ChainParams {
            network,
            checkpoints,
        }
    }

    /// Mainnet parameters, with one anchor per difficulty period stride.
    pub fn mainnet() -> ChainParams {
        ChainParams::new(Network::Bitcoin, MAINNET_CHECKPOINTS.to_vec())
    }

    /// Testnet3 parameters.
    pub fn testnet() -> ChainParams {
        ChainParams::new(Network::Testnet, TESTNET_CHECKPOINTS.to_vec())
    }

    /// The latest checkpoint mined strictly before this UNIX time, if any.
    pub fn checkpoint_before(&self, timestamp: u64) -> Option<Checkpoint> {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.timestamp < timestamp)
            .copied()
    }

    /// The latest checkpoint strictly below this block height, if any.
    pub fn checkpoint_before_height(&self, height: u64) -> Option<Checkpoint> {
        self.checkpoints
            .iter()
            .rev()
            .find(|c| c.height < height)
            .copied()
    }
}

// One anchor per 20160-block span, header timestamps.
const MAINNET_CHECKPOINTS: &[Checkpoint] = &[
    cp(0, 1231006505),
    cp(20160, 1248481816),
    cp(40320, 1266191579),
    cp(60480, 1276298786),
    cp(80640, 1284861847),
    cp(100800, 1294031411),
    cp(120960, 1304131980),
    cp(141120, 1313451894),
    cp(161280, 1326047176),
    cp(181440, 1337883029),
    cp(201600, 1349226660),
    cp(221760, 1361148470),
    cp(241920, 1371418654),
    cp(262080, 1381070552),
    cp(282240, 1390570126),
    cp(302400, 1400928750),
    cp(322560, 1411680080),
    cp(342720, 1423496415),
    cp(362880, 1435475246),
    cp(383040, 1447236692),
    cp(403200, 1458292068),
    cp(423360, 1470163842),
    cp(443520, 1481765313),
    cp(463680, 1493259601),
    cp(483840, 1504704195),
    cp(504000, 1515827554),
    cp(524160, 1527168053),
    cp(544320, 1538639362),
    cp(564480, 1549406542),
    cp(584640, 1562663868),
];

const TESTNET_CHECKPOINTS: &[Checkpoint] = &[
    cp(0, 1296688602),
    cp(100800, 1376543922),
    cp(201600, 1393813869),
    cp(302400, 1413766239),
    cp(403200, 1431821666),
    cp(504000, 1436951946),
    cp(604800, 1447484641),
    cp(705600, 1455728685),
    cp(806400, 1462006183),
    cp(907200, 1469705562),
    cp(1008000, 1476926743),
    cp(1108800, 1490751239),
];

const fn cp(height: u64, timestamp: u64) -> Checkpoint {
    Checkpoint { height, timestamp }
}
