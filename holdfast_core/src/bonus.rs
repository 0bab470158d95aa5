//! Hold & Win respin feature.
//!
//! A session starts from the grid that fired the trigger. Trigger symbols stay on the grid
//! for the rest of the session and every other slot is cleared. Each respin may land more
//! trigger symbols; a landing refills the respin budget and a blank respin spends one. The
//! session settles when the budget runs out or all fifteen slots are held.
//!
//! Every draw, including the value attached to a held slot, comes from the respin's derived
//! hash, so a revealed secret is enough to replay the whole session.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::commit::{reveal_round, Commitment};
use crate::config::{BonusConfig, GameConfig, PayoutPolicy, TierTable};
use crate::engine::Grid;
use crate::error::{EngineResult, ProtocolViolation};
use crate::lines::{count_triggers, is_bonus_triggered};
use crate::rng::{DerivedHash, SpinSeeds};
use crate::symbols::{Symbol, SLOTS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Idle,
    Active,
    Settled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Base,
    Mid,
    High,
}

impl Tier {
    /// Tier for a draw in [0, 1).
    pub fn from_roll(roll: f64, tiers: &TierTable) -> Self {
        if roll < tiers.high.probability {
            Tier::High
        } else if roll < tiers.high.probability + tiers.mid.probability {
            Tier::Mid
        } else {
            Tier::Base
        }
    }

    pub fn multiplier(self, tiers: &TierTable) -> f64 {
        match self {
            Tier::High => tiers.high.multiplier,
            Tier::Mid => tiers.mid.multiplier,
            Tier::Base => tiers.base_multiplier,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cell", rename_all = "snake_case")]
pub enum BonusCell {
    Empty,
    Held { tier: Tier, value: f64 },
}

impl BonusCell {
    pub fn is_held(&self) -> bool {
        matches!(self, BonusCell::Held { .. })
    }
}

fn tier_label(respin: u32, slot: usize) -> String {
    format!("tier:{respin}:{slot}")
}

/// Random inputs for one respin.
#[derive(Debug, Clone, PartialEq)]
pub struct RespinDraws {
    pub land: [bool; SLOTS],
    pub tier_rolls: [f64; SLOTS],
}

impl RespinDraws {
    /// Slot `s` lands when its 16-bit hash slice, scaled to [0, 1), is under the land probability.
    pub fn derive(hash: &DerivedHash, respin: u32, bonus: &BonusConfig) -> Self {
        let mut land = [false; SLOTS];
        let mut tier_rolls = [0.0; SLOTS];
        for slot in 0..SLOTS {
            land[slot] = (hash.slot_slice(slot) as f64) / 65536.0 < bonus.land_probability;
            tier_rolls[slot] = hash.labelled_unit(&tier_label(respin, slot));
        }
        Self { land, tier_rolls }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespinOutcome {
    pub nonce: u64,
    pub derived_hash: String,
    /// Slots that became sticky on this respin.
    pub landed: Vec<usize>,
    pub new_symbols_added: usize,
    pub bonus_value_so_far: f64,
    pub respins_remaining: u8,
    pub session_complete: bool,
    pub cells: [BonusCell; SLOTS],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BonusSettlement {
    pub payout: f64,
    pub cells: [BonusCell; SLOTS],
    pub respins_played: u32,
    pub full_grid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusSession {
    state: SessionState,
    cells: [BonusCell; SLOTS],
    bet: f64,
    respin_budget: u8,
    respins_remaining: u8,
    respins_played: u32,
    accumulated: f64,
    commitment: Option<Commitment>,
    client_seed: String,
    last_nonce: u64,
}

impl BonusSession {
    pub fn new(bet: f64) -> Self {
        Self {
            state: SessionState::Idle,
            cells: [BonusCell::Empty; SLOTS],
            bet,
            respin_budget: 0,
            respins_remaining: 0,
            respins_played: 0,
            accumulated: 0.0,
            commitment: None,
            client_seed: String::new(),
            last_nonce: 0,
        }
    }

    /// Opens a session from the triggering spin's seeds and grid.
    pub fn start(
        seeds: &SpinSeeds,
        grid: &Grid,
        bet: f64,
        config: &GameConfig,
    ) -> EngineResult<Self> {
        let mut session = Self::new(bet);
        session.activate(seeds, grid, config)?;
        Ok(session)
    }

    /// Idle -> Active. Trigger symbols on `grid` become sticky and draw their values from the
    /// triggering spin's hash.
    pub fn activate(
        &mut self,
        seeds: &SpinSeeds,
        grid: &Grid,
        config: &GameConfig,
    ) -> EngineResult<()> {
        if self.state != SessionState::Idle {
            return Err(ProtocolViolation::SessionNotIdle.into());
        }
        let count = count_triggers(grid);
        if config.payout_policy != PayoutPolicy::HoldAndWin
            || !is_bonus_triggered(count, config.trigger_threshold)
        {
            return Err(ProtocolViolation::BonusNotTriggered {
                count,
                threshold: config.trigger_threshold,
            }
            .into());
        }

        let hash = seeds.derived_hash();
        let tiers = &config.bonus.tiers;
        for (slot, symbol) in grid.0.iter().enumerate() {
            if *symbol == Symbol::Trigger {
                let roll = hash.labelled_unit(&tier_label(0, slot));
                self.hold(slot, Tier::from_roll(roll, tiers), tiers);
            }
        }

        self.respin_budget = config.bonus.respin_budget;
        self.respins_remaining = self.respin_budget;
        self.commitment = Some(reveal_round(&seeds.server_secret));
        self.client_seed = seeds.client_seed.clone();
        self.last_nonce = seeds.nonce;
        self.state = SessionState::Active;
        if self.held_count() == SLOTS {
            self.state = SessionState::Settled;
        }
        info!(
            nonce = seeds.nonce,
            held = count,
            value = self.accumulated,
            "hold and win started"
        );
        Ok(())
    }

    /// Plays one respin. `session_grid` is the caller's view of the sticky positions and must
    /// agree with the server's.
    pub fn advance_respin(
        &mut self,
        seeds: &SpinSeeds,
        session_grid: Option<&[Option<Symbol>]>,
        config: &GameConfig,
    ) -> EngineResult<RespinOutcome> {
        if self.state != SessionState::Active {
            return Err(ProtocolViolation::SessionNotActive { state: self.state }.into());
        }
        match &self.commitment {
            Some(c) if c.matches(&seeds.server_secret) => {}
            _ => return Err(ProtocolViolation::SecretMismatch.into()),
        }
        if seeds.client_seed != self.client_seed {
            return Err(ProtocolViolation::ClientSeedMismatch.into());
        }
        if seeds.nonce <= self.last_nonce {
            return Err(ProtocolViolation::NonceReuse {
                nonce: seeds.nonce,
                last: self.last_nonce,
            }
            .into());
        }
        if let Some(grid) = session_grid {
            self.check_session_grid(grid)?;
        }

        let hash = seeds.derived_hash();
        let draws = RespinDraws::derive(&hash, self.respins_played + 1, &config.bonus);
        self.last_nonce = seeds.nonce;
        let landed = self.apply_draws(&draws, &config.bonus.tiers);

        debug!(
            nonce = seeds.nonce,
            landed = landed.len(),
            remaining = self.respins_remaining,
            value = self.accumulated,
            "respin played"
        );
        if self.state == SessionState::Settled {
            info!(
                respins = self.respins_played,
                payout = self.accumulated,
                full_grid = self.held_count() == SLOTS,
                "hold and win settled"
            );
        }

        Ok(RespinOutcome {
            nonce: seeds.nonce,
            derived_hash: hash.to_hex(),
            new_symbols_added: landed.len(),
            landed,
            bonus_value_so_far: self.accumulated,
            respins_remaining: self.respins_remaining,
            session_complete: self.state == SessionState::Settled,
            cells: self.cells,
        })
    }

    /// Respins at consecutive nonces after the last one used until the session settles.
    pub fn run_to_completion(
        &mut self,
        seeds: &SpinSeeds,
        config: &GameConfig,
    ) -> EngineResult<Vec<RespinOutcome>> {
        let mut out = Vec::new();
        while self.state == SessionState::Active {
            let nonce = self
                .last_nonce
                .checked_add(1)
                .ok_or(ProtocolViolation::NonceExhausted(self.last_nonce))?;
            let next = seeds.with_nonce(nonce);
            out.push(self.advance_respin(&next, None, config)?);
        }
        Ok(out)
    }

    pub(crate) fn apply_draws(&mut self, draws: &RespinDraws, tiers: &TierTable) -> Vec<usize> {
        let mut landed = Vec::new();
        for slot in 0..SLOTS {
            if !self.cells[slot].is_held() && draws.land[slot] {
                self.hold(slot, Tier::from_roll(draws.tier_rolls[slot], tiers), tiers);
                landed.push(slot);
            }
        }
        self.respins_played += 1;

        if landed.is_empty() {
            self.respins_remaining = self.respins_remaining.saturating_sub(1);
        } else {
            self.respins_remaining = self.respin_budget;
        }
        if self.respins_remaining == 0 || self.held_count() == SLOTS {
            self.state = SessionState::Settled;
        }
        landed
    }

    fn hold(&mut self, slot: usize, tier: Tier, tiers: &TierTable) {
        let value = tier.multiplier(tiers) * self.bet;
        self.cells[slot] = BonusCell::Held { tier, value };
        self.accumulated += value;
    }

    fn check_session_grid(&self, grid: &[Option<Symbol>]) -> Result<(), ProtocolViolation> {
        if grid.len() != SLOTS {
            return Err(ProtocolViolation::MalformedSessionGrid { len: grid.len() });
        }
        let agrees = self.cells.iter().zip(grid).all(|(cell, seen)| match seen {
            Some(Symbol::Trigger) => cell.is_held(),
            None => !cell.is_held(),
            Some(_) => false,
        });
        if agrees {
            Ok(())
        } else {
            Err(ProtocolViolation::StickyGridMismatch)
        }
    }

    /// The sticky grid as the client should echo it back.
    pub fn session_grid(&self) -> Vec<Option<Symbol>> {
        self.cells
            .iter()
            .map(|c| c.is_held().then_some(Symbol::Trigger))
            .collect()
    }

    pub fn settlement(&self) -> Option<BonusSettlement> {
        (self.state == SessionState::Settled).then(|| BonusSettlement {
            payout: self.accumulated,
            cells: self.cells,
            respins_played: self.respins_played,
            full_grid: self.held_count() == SLOTS,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn cells(&self) -> &[BonusCell; SLOTS] {
        &self.cells
    }

    pub fn held_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_held()).count()
    }

    pub fn respins_remaining(&self) -> u8 {
        self.respins_remaining
    }

    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    pub fn bet(&self) -> f64 {
        self.bet
    }

    pub fn last_nonce(&self) -> u64 {
        self.last_nonce
    }
}
