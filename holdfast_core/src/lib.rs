pub mod bonus;
pub mod commit;
pub mod config;
pub mod engine;
pub mod error;
pub mod lines;
pub mod paytable;
pub mod rng;
pub mod rounds;
pub mod simulate;
pub mod symbols;
pub mod verify;

pub use crate::bonus::{BonusCell, BonusSession, BonusSettlement, RespinOutcome, SessionState, Tier};
pub use crate::commit::{begin_round, reveal_round, verify_commitment, Commitment, ServerSecret};
pub use crate::config::{BonusConfig, GameConfig, PayoutPolicy, TierSpec, TierTable};
pub use crate::engine::{compute_reel_window, derive_grid, spin, Grid, SpinOutcome};
pub use crate::error::{EngineError, EngineResult, ProtocolViolation};
pub use crate::lines::{count_triggers, evaluate, is_bonus_triggered, WinEntry, WinKind};
pub use crate::paytable::{Payline, Paytable, PaytableEntry};
pub use crate::rng::{derive_hash_hex, DerivedHash, SpinSeeds};
pub use crate::rounds::{
    RespinRecord, RespinRequest, RoundCommitment, RoundReveal, RoundTable, SpinRecord, SpinRequest,
    SpinResult,
};
pub use crate::simulate::{simulate, RtpReport};
pub use crate::symbols::{ReelsConfig, Symbol};
pub use crate::verify::{
    commitment_matches, replay_bonus, verify, verify_record, verify_reveal, VerificationReport,
};
