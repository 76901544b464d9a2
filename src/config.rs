use serde::{Deserialize, Serialize};

use crate::errors::LedgerError;
use crate::shorthash::ShortHashLimits;
use crate::work::Work;

/*
Example config file:

[network]
network_id = 1
initial_difficulty = 100_000_000
initial_diurnal_difficulty = 144_000_000_000
target_batch_interval_us = 60_000_000
target_diurn_length_us = 86_400_000_000
mined_credit_amount = 100_000_000
max_outputs_per_transaction = 2_000

[short_hashes]
max_entries = 30_000
max_combinations = 1_048_576

[validation]
timestamp_leeway_us = 2_000_000
spot_checks = true

*/

/// Ledger parameters.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Consensus parameters shared by every node of the network.
    #[serde(default)]
    pub network: Network,

    /// Bounds of the short-hash recovery search.
    #[serde(default)]
    pub short_hashes: ShortHashLimits,

    /// Local validation policy.
    #[serde(default)]
    pub validation: Validation,
}

/// Consensus parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Identifier every header of the network carries.
    #[serde(default = "Network::default_network_id")]
    pub network_id: u64,

    /// Difficulty of the first header.
    #[serde(default = "Network::default_initial_difficulty")]
    pub initial_difficulty: u64,

    /// Diurnal difficulty until the first calend.
    #[serde(default = "Network::default_initial_diurnal_difficulty")]
    pub initial_diurnal_difficulty: u64,

    /// Desired time between headers, in microseconds.
    #[serde(default = "Network::default_target_batch_interval")]
    pub target_batch_interval_us: u64,

    /// Desired time between calends, in microseconds.
    #[serde(default = "Network::default_target_diurn_length")]
    pub target_diurn_length_us: u64,

    /// Amount issued to the miner of each header.
    #[serde(default = "Network::default_mined_credit_amount")]
    pub mined_credit_amount: u64,

    /// Maximum number of outputs of a transaction.
    #[serde(default = "Network::default_max_outputs")]
    pub max_outputs_per_transaction: usize,
}

/// Local validation policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Validation {
    /// How far into the future a header timestamp may be, in microseconds.
    #[serde(default = "Validation::default_timestamp_leeway")]
    pub timestamp_leeway_us: u64,

    /// Whether to spot check proofs of work of incoming headers.
    #[serde(default = "Validation::default_spot_checks")]
    pub spot_checks: bool,
}

impl LedgerConfig {
    /// Parses the configuration from a TOML document.
    /// Missing sections and fields take their default values.
    pub fn from_toml(text: &str) -> Result<Self, LedgerError> {
        Ok(toml::from_str(text)?)
    }

    /// Returns a documentation for the config file.
    pub fn documentation() -> &'static str {
        r##"
    [network]
    network_id = 1                          # identifier carried by every header
    initial_difficulty = 100_000_000        # difficulty of the first header
    initial_diurnal_difficulty = 144_000_000_000  # calend threshold of the first header
    target_batch_interval_us = 60_000_000   # desired time between headers
    target_diurn_length_us = 86_400_000_000 # desired time between calends
    mined_credit_amount = 100_000_000       # amount issued to the miner of each header
    max_outputs_per_transaction = 2_000     # upper bound on transaction outputs

    [short_hashes]
    max_entries = 30_000                    # longest message list that is recovered
    max_combinations = 1_048_576            # largest search before a known solution is required

    [validation]
    timestamp_leeway_us = 2_000_000         # tolerated clock drift for incoming headers
    spot_checks = true                      # whether to spot check proofs of work
"##
    }
}

impl Network {
    /// Default network identifier.
    pub fn default_network_id() -> u64 {
        1
    }

    /// Default difficulty of the first header.
    pub fn default_initial_difficulty() -> u64 {
        100_000_000
    }

    /// Default diurnal difficulty: one day of headers at the initial difficulty.
    pub fn default_initial_diurnal_difficulty() -> u64 {
        Self::default_initial_difficulty() * 1_440
    }

    /// One minute.
    pub fn default_target_batch_interval() -> u64 {
        60_000_000
    }

    /// One day.
    pub fn default_target_diurn_length() -> u64 {
        86_400_000_000
    }

    /// Default issuance per header.
    pub fn default_mined_credit_amount() -> u64 {
        100_000_000
    }

    /// Default cap on transaction outputs.
    pub fn default_max_outputs() -> usize {
        2_000
    }

    /// Initial difficulty as work units.
    pub fn initial_difficulty(&self) -> Work {
        Work::from(self.initial_difficulty)
    }

    /// Initial diurnal difficulty as work units.
    pub fn initial_diurnal_difficulty(&self) -> Work {
        Work::from(self.initial_diurnal_difficulty)
    }
}

impl Default for Network {
    fn default() -> Self {
        Network {
            network_id: Self::default_network_id(),
            initial_difficulty: Self::default_initial_difficulty(),
            initial_diurnal_difficulty: Self::default_initial_diurnal_difficulty(),
            target_batch_interval_us: Self::default_target_batch_interval(),
            target_diurn_length_us: Self::default_target_diurn_length(),
            mined_credit_amount: Self::default_mined_credit_amount(),
            max_outputs_per_transaction: Self::default_max_outputs(),
        }
    }
}

impl Validation {
    /// Two seconds.
    pub fn default_timestamp_leeway() -> u64 {
        2_000_000
    }

    /// Spot checks are on by default.
    pub fn default_spot_checks() -> bool {
        true
    }
}

impl Default for Validation {
    fn default() -> Self {
        Validation {
            timestamp_leeway_us: Self::default_timestamp_leeway(),
            spot_checks: Self::default_spot_checks(),
        }
    }
}
