use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use holdfast_core::{
    BonusCell, RespinOutcome, RoundCommitment, RoundReveal, RtpReport, SpinResult,
    VerificationReport, WinEntry,
};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CommitResponse {
    pub round_id: Uuid,
    /// SHA-256 of the server secret, published before the spin.
    pub commitment: String,
}

impl From<&RoundCommitment> for CommitResponse {
    fn from(c: &RoundCommitment) -> Self {
        Self {
            round_id: c.round_id,
            commitment: c.commitment.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinResponse {
    pub round_id: Uuid,
    pub nonce: u64,
    pub derived_hash: String,
    pub stop_indices: Vec<usize>,
    pub reels: Vec<Vec<u8>>, // symbol indices, one column per reel, top to bottom
    pub payout: f64,
    pub wins: Vec<WinEntry>,
    pub trigger_count: usize,
    pub bonus_triggered: bool,
    pub bonus_value: Option<f64>,
}

impl SpinResponse {
    pub fn new(result: &SpinResult, nonce: u64) -> Self {
        let out = &result.outcome;
        Self {
            round_id: result.round_id,
            nonce,
            derived_hash: out.derived_hash.clone(),
            stop_indices: out.stop_indices.to_vec(),
            reels: out.grid.columns(),
            payout: out.total_win,
            wins: out.wins.clone(),
            trigger_count: out.trigger_count,
            bonus_triggered: out.bonus_triggered,
            bonus_value: result.bonus_value,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BonusRespinResponse {
    pub nonce: u64,
    pub derived_hash: String,
    pub landed: Vec<usize>,
    pub new_symbols_added: usize,
    pub bonus_value_so_far: f64,
    pub respins_remaining: u8,
    pub session_complete: bool,
    /// Slot values; `None` for slots not yet held.
    pub slots: Vec<Option<f64>>,
}

impl From<&RespinOutcome> for BonusRespinResponse {
    fn from(o: &RespinOutcome) -> Self {
        Self {
            nonce: o.nonce,
            derived_hash: o.derived_hash.clone(),
            landed: o.landed.clone(),
            new_symbols_added: o.new_symbols_added,
            bonus_value_so_far: o.bonus_value_so_far,
            respins_remaining: o.respins_remaining,
            session_complete: o.session_complete,
            slots: o
                .cells
                .iter()
                .map(|c| match c {
                    BonusCell::Held { value, .. } => Some(*value),
                    BonusCell::Empty => None,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RoundResponse {
    pub commit: CommitResponse,
    pub spin: SpinResponse,
    pub respins: Vec<BonusRespinResponse>,
    pub server_secret: String,
    pub bonus_payout: Option<f64>,
    pub total_payout: f64,
    pub verified: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct VerifyResponse {
    pub fair: bool,
    pub failures: Vec<String>,
    /// `None` when no published commitment was supplied.
    pub commitment_matches: Option<bool>,
    pub derived_hash: String,
    pub reels: Vec<Vec<u8>>,
    pub payout: f64,
    pub wins: Vec<WinEntry>,
    pub bonus_triggered: bool,
    pub bonus_payout: Option<f64>,
}

impl From<&VerificationReport> for VerifyResponse {
    fn from(r: &VerificationReport) -> Self {
        Self {
            fair: r.is_fair(),
            failures: r.failures().into_iter().map(str::to_string).collect(),
            commitment_matches: Some(r.commitment_matches),
            derived_hash: r.replayed.derived_hash.clone(),
            reels: r.replayed.grid.columns(),
            payout: r.replayed.total_win,
            wins: r.replayed.wins.clone(),
            bonus_triggered: r.replayed.bonus_triggered,
            bonus_payout: r.replayed_bonus_payout,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RtpResponse {
    pub spins: u64,
    pub total_bet: f64,
    pub line_winnings: f64,
    pub bonus_winnings: f64,
    pub bonus_triggers: u64,
    pub rtp: f64,
    pub house_edge: f64,
}

impl From<&RtpReport> for RtpResponse {
    fn from(r: &RtpReport) -> Self {
        Self {
            spins: r.spins,
            total_bet: r.total_bet,
            line_winnings: r.line_winnings,
            bonus_winnings: r.bonus_winnings,
            bonus_triggers: r.bonus_triggers,
            rtp: r.rtp,
            house_edge: r.house_edge,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SpinLogEntry {
    pub id: i64,
    pub ts: DateTime<Utc>,
    pub round_id: Uuid,
    pub client_seed: String,
    pub nonce: u64,
    pub commitment: String,
    pub server_secret: String,
    pub result_reels: Vec<Vec<u8>>,
    pub payout: f64,
    pub bonus_payout: Option<f64>,
}

impl SpinLogEntry {
    /// Log line for a revealed round. Returns `None` for a round that was never spun.
    pub fn from_reveal(id: i64, ts: DateTime<Utc>, reveal: &RoundReveal) -> Option<Self> {
        let spin = reveal.spin.as_ref()?;
        Some(Self {
            id,
            ts,
            round_id: reveal.round_id,
            client_seed: spin.client_seed.clone(),
            nonce: spin.nonce,
            commitment: reveal.commitment.to_string(),
            server_secret: reveal.server_secret.clone(),
            result_reels: spin.grid.chunks(3).map(<[u8]>::to_vec).collect(),
            payout: spin.total_win,
            bonus_payout: reveal.bonus_payout,
        })
    }

    pub fn total_payout(&self) -> f64 {
        self.payout + self.bonus_payout.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use holdfast_core::{verify_record, GameConfig, RespinRequest, RoundTable, SpinRequest, Symbol};
    use std::sync::Arc;

    #[test]
    fn reels_are_columns_of_the_grid() {
        let table = RoundTable::new(Arc::new(GameConfig::standard())).unwrap();
        let (commit, result) = loop {
            let commit = table.begin_round().unwrap();
            let req = SpinRequest {
                client_seed: "c".into(),
                nonce: 1,
                bet: 1.0,
            };
            let result = table.spin(commit.round_id, req).unwrap();
            if !result.outcome.bonus_triggered {
                break (commit, result);
            }
            table.discard_round(commit.round_id);
        };
        let resp = SpinResponse::new(&result, 1);
        assert_eq!(resp.reels.len(), 5);
        for (reel, column) in resp.reels.iter().enumerate() {
            for (row, idx) in column.iter().enumerate() {
                assert_eq!(*idx, result.outcome.grid.get(reel, row).to_index());
            }
        }
        let reveal = table.reveal_round(commit.round_id).unwrap();
        let entry = SpinLogEntry::from_reveal(1, Utc::now(), &reveal).unwrap();
        assert_eq!(entry.result_reels, resp.reels);
        assert_eq!(entry.total_payout(), reveal.total_payout());

        let report = verify_record(reveal.spin.as_ref().unwrap(), table.config()).unwrap();
        let verified = VerifyResponse::from(&report);
        assert_eq!(verified.commitment_matches, Some(true));
        assert_eq!(verified.wins, result.outcome.wins);
        assert_eq!(verified.reels, resp.reels);
        assert!(verified.fair);
    }

    #[test]
    fn respin_response_counts_new_symbols() {
        let table = RoundTable::new(Arc::new(GameConfig::standard())).unwrap();
        let (id, mut grid, mut nonce) = loop {
            let id = table.begin_round().unwrap().round_id;
            let req = SpinRequest {
                client_seed: "c".into(),
                nonce: 1,
                bet: 1.0,
            };
            let spun = table.spin(id, req).unwrap();
            match spun.session_grid {
                Some(grid) if !spun.bonus_settled => break (id, grid, 1),
                _ => {
                    table.discard_round(id);
                }
            }
        };
        loop {
            nonce += 1;
            let req = RespinRequest {
                client_seed: "c".into(),
                nonce,
                session_grid: grid,
                bet: 1.0,
            };
            let out = table.advance_bonus_respin(id, req).unwrap();
            let resp = BonusRespinResponse::from(&out);
            assert_eq!(resp.new_symbols_added, out.landed.len());
            assert_eq!(resp.landed, out.landed);
            for slot in &resp.landed {
                assert!(resp.slots[*slot].is_some());
            }
            if resp.session_complete {
                break;
            }
            grid = out
                .cells
                .iter()
                .map(|c| c.is_held().then_some(Symbol::Trigger))
                .collect();
        }
    }
}
