//! Open rounds and the request boundary.
//!
//! Each round owns one committed server secret, at most one base spin and at most one
//! Hold & Win session. Rounds sit behind their own mutex; a request that finds its round
//! already locked is turned away with [`ProtocolViolation::RoundBusy`] instead of queueing,
//! so respins on a session always happen in one total order.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, TryLockError};
use tracing::{info, warn};
use uuid::Uuid;

use crate::bonus::{BonusSession, RespinOutcome, SessionState};
use crate::commit::{begin_round, reveal_round, Commitment, ServerSecret};
use crate::config::GameConfig;
use crate::engine::{spin, SpinOutcome};
use crate::error::{EngineError, EngineResult, ProtocolViolation};
use crate::rng::SpinSeeds;
use crate::symbols::Symbol;

/// Everything a third party needs to replay a base spin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinRecord {
    pub commitment: Commitment,
    /// Filled in once the round is revealed.
    pub server_secret: Option<String>,
    pub client_seed: String,
    pub nonce: u64,
    pub derived_hash: String,
    pub stop_indices: Vec<usize>,
    /// Symbol wire indices, `reel * 3 + row`.
    pub grid: Vec<u8>,
    pub total_win: f64,
    pub bet: f64,
    pub trigger_count: usize,
    pub bonus_triggered: bool,
}

impl SpinRecord {
    pub fn from_outcome(
        commitment: Commitment,
        client_seed: &str,
        nonce: u64,
        bet: f64,
        outcome: &SpinOutcome,
    ) -> Self {
        Self {
            commitment,
            server_secret: None,
            client_seed: client_seed.to_string(),
            nonce,
            derived_hash: outcome.derived_hash.clone(),
            stop_indices: outcome.stop_indices.to_vec(),
            grid: outcome.grid.to_indices(),
            total_win: outcome.total_win,
            bet,
            trigger_count: outcome.trigger_count,
            bonus_triggered: outcome.bonus_triggered,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespinRecord {
    pub nonce: u64,
    pub derived_hash: String,
    pub landed: Vec<usize>,
    pub new_symbols_added: usize,
    pub bonus_value_so_far: f64,
    pub respins_remaining: u8,
}

impl From<&RespinOutcome> for RespinRecord {
    fn from(o: &RespinOutcome) -> Self {
        Self {
            nonce: o.nonce,
            derived_hash: o.derived_hash.clone(),
            landed: o.landed.clone(),
            new_symbols_added: o.new_symbols_added,
            bonus_value_so_far: o.bonus_value_so_far,
            respins_remaining: o.respins_remaining,
        }
    }
}

/// A finished round with its secret disclosed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundReveal {
    pub round_id: Uuid,
    pub server_secret: String,
    pub commitment: Commitment,
    pub spin: Option<SpinRecord>,
    pub respins: Vec<RespinRecord>,
    pub bonus_payout: Option<f64>,
}

impl RoundReveal {
    pub fn total_payout(&self) -> f64 {
        self.spin.as_ref().map_or(0.0, |s| s.total_win) + self.bonus_payout.unwrap_or(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundCommitment {
    pub round_id: Uuid,
    pub commitment: Commitment,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinRequest {
    pub client_seed: String,
    pub nonce: u64,
    pub bet: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinResult {
    pub round_id: Uuid,
    pub outcome: SpinOutcome,
    /// Sticky grid to echo back on the first respin, when the spin opened a bonus.
    pub session_grid: Option<Vec<Option<Symbol>>>,
    pub bonus_value: Option<f64>,
    /// The bonus filled the grid on the triggering spin and is already settled.
    pub bonus_settled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespinRequest {
    pub client_seed: String,
    pub nonce: u64,
    pub session_grid: Vec<Option<Symbol>>,
    pub bet: f64,
}

#[derive(Debug)]
enum RoundPhase {
    Committed,
    Bonus(BonusSession),
    Settled { bonus_payout: Option<f64> },
}

#[derive(Debug)]
struct Round {
    secret: ServerSecret,
    commitment: Commitment,
    phase: RoundPhase,
    spin: Option<SpinRecord>,
    respins: Vec<RespinRecord>,
}

pub struct RoundTable {
    config: Arc<GameConfig>,
    rounds: RwLock<HashMap<Uuid, Arc<Mutex<Round>>>>,
}

impl RoundTable {
    pub fn new(config: Arc<GameConfig>) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            rounds: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &Arc<GameConfig> {
        &self.config
    }

    pub fn open_rounds(&self) -> usize {
        self.rounds.read().expect("round registry poisoned").len()
    }

    /// Draws a secret for a new round and publishes its commitment only.
    pub fn begin_round(&self) -> EngineResult<RoundCommitment> {
        let (secret, commitment) = begin_round()?;
        let round_id = Uuid::new_v4();
        let round = Round {
            secret,
            commitment: commitment.clone(),
            phase: RoundPhase::Committed,
            spin: None,
            respins: Vec::new(),
        };
        self.rounds
            .write()
            .expect("round registry poisoned")
            .insert(round_id, Arc::new(Mutex::new(round)));
        info!(%round_id, %commitment, "round committed");
        Ok(RoundCommitment {
            round_id,
            commitment,
        })
    }

    pub fn spin(&self, round_id: Uuid, req: SpinRequest) -> EngineResult<SpinResult> {
        let config = Arc::clone(&self.config);
        self.with_round(round_id, |round| {
            if !(req.bet.is_finite() && req.bet > 0.0) {
                return Err(ProtocolViolation::InvalidBet(req.bet).into());
            }
            if req.client_seed.is_empty() {
                return Err(ProtocolViolation::EmptyClientSeed.into());
            }
            // A bonus opened at the last nonce could never respin or settle.
            if req.nonce == u64::MAX {
                return Err(ProtocolViolation::NonceExhausted(req.nonce).into());
            }
            if !matches!(round.phase, RoundPhase::Committed) {
                return Err(ProtocolViolation::SpinAlreadyPlayed(round_id).into());
            }

            let seeds = SpinSeeds::new(round.secret.expose(), &req.client_seed, req.nonce);
            let outcome = spin(&seeds, req.bet, &config);
            round.spin = Some(SpinRecord::from_outcome(
                round.commitment.clone(),
                &req.client_seed,
                req.nonce,
                req.bet,
                &outcome,
            ));

            let mut result = SpinResult {
                round_id,
                outcome,
                session_grid: None,
                bonus_value: None,
                bonus_settled: false,
            };
            round.phase = if result.outcome.bonus_triggered {
                let session = BonusSession::start(&seeds, &result.outcome.grid, req.bet, &config)?;
                result.session_grid = Some(session.session_grid());
                result.bonus_value = Some(session.accumulated());
                match session.settlement() {
                    Some(settled) => {
                        result.bonus_settled = true;
                        RoundPhase::Settled {
                            bonus_payout: Some(settled.payout),
                        }
                    }
                    None => RoundPhase::Bonus(session),
                }
            } else {
                RoundPhase::Settled { bonus_payout: None }
            };
            info!(
                %round_id,
                nonce = req.nonce,
                total_win = result.outcome.total_win,
                bonus = result.outcome.bonus_triggered,
                "round spun"
            );
            Ok(result)
        })
    }

    pub fn advance_bonus_respin(
        &self,
        round_id: Uuid,
        req: RespinRequest,
    ) -> EngineResult<RespinOutcome> {
        let config = Arc::clone(&self.config);
        self.with_round(round_id, |round| {
            let session = match &mut round.phase {
                RoundPhase::Bonus(session) => session,
                RoundPhase::Committed => {
                    return Err(ProtocolViolation::SessionNotActive {
                        state: SessionState::Idle,
                    }
                    .into())
                }
                RoundPhase::Settled { .. } => {
                    return Err(ProtocolViolation::SessionNotActive {
                        state: SessionState::Settled,
                    }
                    .into())
                }
            };
            if req.bet != session.bet() {
                return Err(ProtocolViolation::BetMismatch {
                    expected: session.bet(),
                    got: req.bet,
                }
                .into());
            }

            let seeds = SpinSeeds::new(round.secret.expose(), &req.client_seed, req.nonce);
            let outcome =
                session.advance_respin(&seeds, Some(req.session_grid.as_slice()), &config)?;
            round.respins.push(RespinRecord::from(&outcome));

            if let Some(settled) = session.settlement() {
                info!(
                    %round_id,
                    payout = settled.payout,
                    respins = settled.respins_played,
                    "bonus settled"
                );
                round.phase = RoundPhase::Settled {
                    bonus_payout: Some(settled.payout),
                };
            }
            Ok(outcome)
        })
    }

    /// Closes a round and discloses its secret. Refused while a bonus session is running.
    pub fn reveal_round(&self, round_id: Uuid) -> EngineResult<RoundReveal> {
        let mut rounds = self.rounds.write().expect("round registry poisoned");
        let entry = rounds
            .get(&round_id)
            .cloned()
            .ok_or(ProtocolViolation::UnknownRound(round_id))?;
        let round = lock_round(&entry, round_id)?;

        let bonus_payout = match &round.phase {
            RoundPhase::Bonus(_) => {
                return Err(ProtocolViolation::BonusInProgress(round_id).into());
            }
            RoundPhase::Committed => None,
            RoundPhase::Settled { bonus_payout } => *bonus_payout,
        };

        let server_secret = round.secret.expose().to_string();
        if reveal_round(&server_secret) != round.commitment {
            return Err(EngineError::VerificationMismatch(format!(
                "round {round_id} secret does not hash to its commitment"
            )));
        }
        let spin = round.spin.clone().map(|mut s| {
            s.server_secret = Some(server_secret.clone());
            s
        });
        let reveal = RoundReveal {
            round_id,
            server_secret,
            commitment: round.commitment.clone(),
            spin,
            respins: round.respins.clone(),
            bonus_payout,
        };
        drop(round);
        rounds.remove(&round_id);
        info!(%round_id, "round revealed");
        Ok(reveal)
    }

    /// Drops a round without revealing it. Nothing has left the engine, so this is always safe.
    pub fn discard_round(&self, round_id: Uuid) -> bool {
        self.rounds
            .write()
            .expect("round registry poisoned")
            .remove(&round_id)
            .is_some()
    }

    fn with_round<T>(
        &self,
        round_id: Uuid,
        f: impl FnOnce(&mut Round) -> EngineResult<T>,
    ) -> EngineResult<T> {
        let entry = self
            .rounds
            .read()
            .expect("round registry poisoned")
            .get(&round_id)
            .cloned()
            .ok_or(ProtocolViolation::UnknownRound(round_id))?;
        let mut round = lock_round(&entry, round_id)?;
        let result = f(&mut round);
        if let Some(violation) = result.as_ref().err().and_then(EngineError::protocol) {
            warn!(%round_id, %violation, "request rejected");
        }
        result
    }
}

fn lock_round(
    entry: &Arc<Mutex<Round>>,
    round_id: Uuid,
) -> EngineResult<std::sync::MutexGuard<'_, Round>> {
    match entry.try_lock() {
        Ok(guard) => Ok(guard),
        Err(TryLockError::WouldBlock) => Err(ProtocolViolation::RoundBusy(round_id).into()),
        Err(TryLockError::Poisoned(_)) => panic!("round {round_id} poisoned by an earlier panic"),
    }
}
