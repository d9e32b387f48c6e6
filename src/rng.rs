//! Deterministic random streams.
//!
//! Every draw in a replication comes from a named stream whose seed is derived
//! from `(base_seed, replication, stream)`. Streams never share state, so the
//! order in which replications execute cannot change what any of them draws.

use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;

const REPLICATION_MIX: u64 = 0x9e37_79b9_7f4a_7c15;
const STREAM_MIX: u64 = 0xd1b5_4a32_d192_ed03;

/// Stable stream slots. Append only: reordering changes every seed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u64)]
pub enum Stream {
    ArrivalCandidates = 0,
    Thinning = 1,
    Risk = 2,
    Patience = 3,
    ChatDuration = 4,
    Terms = 5,
    UserStatus = 6,
}

impl Stream {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ArrivalCandidates => "arrival-candidates",
            Self::Thinning => "thinning",
            Self::Risk => "risk",
            Self::Patience => "patience",
            Self::ChatDuration => "chat-duration",
            Self::Terms => "terms",
            Self::UserStatus => "user-status",
        }
    }
}

/// Seed material for one replication.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SeedBank {
    base_seed: u64,
    replication: u64,
}

impl SeedBank {
    pub fn new(base_seed: u64, replication: usize) -> Self {
        Self {
            base_seed,
            replication: replication as u64,
        }
    }

    /// Seed reported for the replication as a whole.
    pub fn replication_seed(&self) -> u64 {
        splitmix64(
            self.base_seed ^ (self.replication.wrapping_add(1)).wrapping_mul(REPLICATION_MIX),
        )
    }

    pub fn seed_for(&self, stream: Stream) -> u64 {
        splitmix64(self.replication_seed() ^ (stream as u64 + 1).wrapping_mul(STREAM_MIX))
    }

    pub fn stream(&self, stream: Stream) -> Pcg64Mcg {
        Pcg64Mcg::seed_from_u64(self.seed_for(stream))
    }
}

fn splitmix64(mut value: u64) -> u64 {
    value = value.wrapping_add(0x9e37_79b9_7f4a_7c15);
    value = (value ^ (value >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    value = (value ^ (value >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    value ^ (value >> 31)
}
