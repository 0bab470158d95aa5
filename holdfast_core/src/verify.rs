//! Independent replay of revealed rounds.
//!
//! Nothing here reads stored engine state: every result is recomputed from the revealed
//! secret, the client seed and the nonces, through the same code live play uses.

use serde::{Deserialize, Serialize};

use crate::bonus::{BonusSession, BonusSettlement, RespinOutcome};
use crate::commit::Commitment;
use crate::config::GameConfig;
use crate::engine::{spin, Grid, SpinOutcome};
use crate::error::{EngineError, EngineResult};
use crate::rng::SpinSeeds;
use crate::rounds::{RespinRecord, RoundReveal, SpinRecord};

pub use crate::commit::verify_commitment;

/// Recomputes the base spin for revealed inputs.
pub fn verify(
    server_secret: &str,
    client_seed: &str,
    nonce: u64,
    bet: f64,
    config: &GameConfig,
) -> SpinOutcome {
    let seeds = SpinSeeds::new(server_secret, client_seed, nonce);
    spin(&seeds, bet, config)
}

/// Replays a Hold & Win session from its trigger spin through the given respin nonces.
pub fn replay_bonus(
    server_secret: &str,
    client_seed: &str,
    trigger_nonce: u64,
    respin_nonces: &[u64],
    bet: f64,
    config: &GameConfig,
) -> EngineResult<(BonusSettlement, Vec<RespinOutcome>)> {
    let seeds = SpinSeeds::new(server_secret, client_seed, trigger_nonce);
    let trigger = spin(&seeds, bet, config);
    let mut session = BonusSession::start(&seeds, &trigger.grid, bet, config)?;
    let mut respins = Vec::with_capacity(respin_nonces.len());
    for nonce in respin_nonces {
        let next = seeds.with_nonce(*nonce);
        respins.push(session.advance_respin(&next, None, config)?);
    }
    let settlement = session.settlement().ok_or_else(|| {
        EngineError::VerificationMismatch(format!(
            "bonus session still active after {} respins",
            respin_nonces.len()
        ))
    })?;
    Ok((settlement, respins))
}

/// Outcome of replaying one recorded spin. Every flag must hold for the spin to be fair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub commitment_matches: bool,
    pub derived_hash_matches: bool,
    pub stops_match: bool,
    pub grid_matches: bool,
    pub total_win_matches: bool,
    pub trigger_count_matches: bool,
    pub bonus_matches: bool,
    pub replayed: SpinOutcome,
    pub replayed_bonus_payout: Option<f64>,
}

impl VerificationReport {
    pub fn is_fair(&self) -> bool {
        self.commitment_matches
            && self.derived_hash_matches
            && self.stops_match
            && self.grid_matches
            && self.total_win_matches
            && self.trigger_count_matches
            && self.bonus_matches
    }

    /// Names of the checks that failed.
    pub fn failures(&self) -> Vec<&'static str> {
        [
            ("commitment", self.commitment_matches),
            ("derived hash", self.derived_hash_matches),
            ("stop indices", self.stops_match),
            ("grid", self.grid_matches),
            ("total win", self.total_win_matches),
            ("trigger count", self.trigger_count_matches),
            ("bonus", self.bonus_matches),
        ]
        .into_iter()
        .filter(|(_, ok)| !ok)
        .map(|(name, _)| name)
        .collect()
    }

    /// Converts a failed report into a hard error.
    pub fn into_result(self) -> EngineResult<Self> {
        if self.is_fair() {
            Ok(self)
        } else {
            Err(EngineError::VerificationMismatch(format!(
                "mismatched {}",
                self.failures().join(", ")
            )))
        }
    }
}

/// Replays a persisted spin record. The record must carry its revealed secret.
pub fn verify_record(record: &SpinRecord, config: &GameConfig) -> EngineResult<VerificationReport> {
    let secret = record.server_secret.as_deref().ok_or_else(|| {
        EngineError::VerificationMismatch("spin record has no revealed secret".into())
    })?;
    let replayed = verify(
        secret,
        &record.client_seed,
        record.nonce,
        record.bet,
        config,
    );
    Ok(VerificationReport {
        commitment_matches: verify_commitment(secret, &record.commitment),
        derived_hash_matches: replayed.derived_hash == record.derived_hash,
        stops_match: replayed.stop_indices.as_slice() == record.stop_indices.as_slice(),
        grid_matches: Grid::from_indices(&record.grid) == Some(replayed.grid),
        total_win_matches: replayed.total_win == record.total_win,
        trigger_count_matches: replayed.trigger_count == record.trigger_count,
        bonus_matches: replayed.bonus_triggered == record.bonus_triggered,
        replayed,
        replayed_bonus_payout: None,
    })
}

/// Replays a whole revealed round: the base spin and, if it triggered, every respin.
pub fn verify_reveal(
    reveal: &RoundReveal,
    config: &GameConfig,
) -> EngineResult<VerificationReport> {
    let record = reveal.spin.as_ref().ok_or_else(|| {
        EngineError::VerificationMismatch(format!("round {} was never spun", reveal.round_id))
    })?;
    let mut report = verify_record(record, config)?;
    report.commitment_matches &= verify_commitment(&reveal.server_secret, &reveal.commitment)
        && record.server_secret.as_deref() == Some(reveal.server_secret.as_str());

    if record.bonus_triggered {
        let nonces: Vec<u64> = reveal.respins.iter().map(|r| r.nonce).collect();
        match replay_bonus(
            &reveal.server_secret,
            &record.client_seed,
            record.nonce,
            &nonces,
            record.bet,
            config,
        ) {
            Ok((settlement, respins)) => {
                report.bonus_matches &= Some(settlement.payout) == reveal.bonus_payout
                    && respins_match(&respins, &reveal.respins);
                report.replayed_bonus_payout = Some(settlement.payout);
            }
            Err(_) => report.bonus_matches = false,
        }
    } else {
        report.bonus_matches &= reveal.respins.is_empty() && reveal.bonus_payout.is_none();
    }
    Ok(report)
}

fn respins_match(replayed: &[RespinOutcome], recorded: &[RespinRecord]) -> bool {
    replayed.len() == recorded.len()
        && replayed.iter().zip(recorded).all(|(a, b)| {
            a.nonce == b.nonce
                && a.derived_hash == b.derived_hash
                && a.landed == b.landed
                && a.bonus_value_so_far == b.bonus_value_so_far
                && a.respins_remaining == b.respins_remaining
        })
}

/// Checks a secret against a commitment as it was published, in hex.
pub fn commitment_matches(server_secret: &str, published: &str) -> bool {
    verify_commitment(server_secret, &Commitment::from_hex(published))
}
