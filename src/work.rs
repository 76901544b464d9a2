//! Proof-of-work capability and difficulty retargeting.
use merkle::Hash256;
use readerwriter::*;
use serde::{Deserialize, Serialize};

/// Units of work. Total work of a chain is the sum of header difficulties.
pub type Work = u128;

/// Evidence that work was done on a seed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkProof {
    /// Seed the work was done on: the hash of the mined credit.
    pub seed: Hash256,
    /// Difficulty the miner claims to have reached.
    pub claimed_difficulty: Work,
    /// Opaque data interpreted by the proof-of-work implementation.
    pub evidence: Vec<u8>,
}

/// Result of a spot check.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpotCheck {
    /// Every sampled link verified.
    Valid,
    /// A link failed; the evidence lets others confirm the failure.
    Failed {
        /// Data demonstrating the failure.
        evidence: Vec<u8>,
    },
}

impl SpotCheck {
    /// Returns true if the spot check passed.
    pub fn is_valid(&self) -> bool {
        *self == SpotCheck::Valid
    }
}

/// Memory-hard proof of work, consumed as an opaque capability.
pub trait ProofOfWork {
    /// Performs work on the seed until the difficulty is reached.
    fn do_work(&self, seed: Hash256, difficulty: Work) -> WorkProof;

    /// Work the proof demonstrates.
    fn difficulty_achieved(&self, proof: &WorkProof) -> Work;

    /// Cheaply samples the proof for correctness.
    fn spot_check(&self, proof: &WorkProof) -> SpotCheck;
}

/// Proof of work that trusts the claimed difficulty.
///
/// Suitable for test networks where headers come from trusted miners.
#[derive(Copy, Clone, Debug, Default)]
pub struct ClaimedWork;

impl ProofOfWork for ClaimedWork {
    fn do_work(&self, seed: Hash256, difficulty: Work) -> WorkProof {
        WorkProof {
            seed,
            claimed_difficulty: difficulty,
            evidence: Vec::new(),
        }
    }

    fn difficulty_achieved(&self, proof: &WorkProof) -> Work {
        proof.claimed_difficulty
    }

    fn spot_check(&self, _proof: &WorkProof) -> SpotCheck {
        SpotCheck::Valid
    }
}

/// Retargets a difficulty: easier by 5% when the observed interval was longer
/// than the target, harder by the inverse factor otherwise.
pub fn retarget(difficulty: Work, observed_interval: u64, target_interval: u64) -> Work {
    if observed_interval > target_interval {
        difficulty / 100 * 95 + difficulty % 100 * 95 / 100
    } else {
        (difficulty / 95)
            .saturating_mul(100)
            .saturating_add(difficulty % 95 * 100 / 95)
    }
}

/// Steps by which the diurnal difficulty moves after each calend.
pub const DIURN_RETARGET_STEPS: i64 = 60;

/// Moves a diurnal difficulty by `steps` steps of 0.1%: positive steps make
/// it easier, negative steps harder. It never falls to zero.
pub fn adjust_diurnal_difficulty(difficulty: Work, steps: i64) -> Work {
    let mut d = difficulty;
    for _ in 0..steps.unsigned_abs() {
        let next = if steps > 0 {
            d / 1000 * 999 + d % 1000 * 999 / 1000
        } else {
            (d / 999)
                .saturating_mul(1000)
                .saturating_add(d % 999 * 1000 / 999)
        };
        if next == d || next == 0 {
            break;
        }
        d = next;
    }
    d
}

impl Encodable for WorkProof {
    fn encode(&self, w: &mut impl Writer) -> Result<(), WriteError> {
        self.seed.encode(w)?;
        w.write_u128(b"claimed_difficulty", self.claimed_difficulty)?;
        w.write_size(b"n", self.evidence.len())?;
        w.write(b"evidence", &self.evidence)
    }
}

impl Decodable for WorkProof {
    fn decode(r: &mut impl Reader) -> Result<Self, ReadError> {
        let seed = Hash256::decode(r)?;
        let claimed_difficulty = r.read_u128()?;
        let n = r.read_size()?;
        let evidence = r.read_bytes(n)?;
        Ok(WorkProof {
            seed,
            claimed_difficulty,
            evidence,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slow_intervals_ease_difficulty() {
        assert_eq!(retarget(100_000_000, 61_000_000, 60_000_000), 95_000_000);
        assert_eq!(retarget(95_000_000, 59_000_000, 60_000_000), 100_000_000);
        assert_eq!(retarget(95_000_000, 60_000_000, 60_000_000), 100_000_000);
    }

    #[test]
    fn retarget_does_not_overflow() {
        let huge = Work::max_value() - 1;
        assert!(retarget(huge, 1, 0) < huge);
        assert_eq!(retarget(huge, 0, 1), Work::max_value());
    }

    #[test]
    fn diurnal_steps_are_a_tenth_of_a_percent() {
        assert_eq!(adjust_diurnal_difficulty(1_000_000, 1), 999_000);
        assert_eq!(adjust_diurnal_difficulty(999_000, -1), 1_000_000);
        assert_eq!(adjust_diurnal_difficulty(1_000_000, 0), 1_000_000);
        assert_eq!(
            adjust_diurnal_difficulty(1_000_000, 3),
            adjust_diurnal_difficulty(adjust_diurnal_difficulty(1_000_000, 1), 2)
        );
    }

    #[test]
    fn diurnal_difficulty_stays_positive() {
        assert_eq!(adjust_diurnal_difficulty(5, i64::max_value()), 1);
        assert_eq!(adjust_diurnal_difficulty(Work::max_value(), -1), Work::max_value());
    }

    #[test]
    fn claimed_work_reports_claim() {
        let proof = ClaimedWork.do_work(Hash256::digest(b"seed"), 42);
        assert_eq!(ClaimedWork.difficulty_achieved(&proof), 42);
        assert!(ClaimedWork.spot_check(&proof).is_valid());
        assert_eq!(WorkProof::decode_from_slice(&proof.encode_to_vec()), Ok(proof));
    }
}
