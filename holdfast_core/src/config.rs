//! The single game definition shared by live play, verification and simulation.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::{EngineError, EngineResult};
use crate::paytable::{Payline, Paytable, MIN_RUN};
use crate::symbols::{ReelsConfig, Symbol, REELS, ROWS, SLOTS};

/// What a grid with enough trigger symbols pays. Exactly one applies per game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PayoutPolicy {
    /// Open a Hold & Win session; its accrued value is the only trigger payout.
    HoldAndWin,
    /// Pay `bet * multiplier` as a scatter win; no bonus session.
    ScatterPay { multiplier: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierSpec {
    pub probability: f64,
    /// Multiple of the total bet.
    pub multiplier: f64,
}

/// Value drawn for a slot at the moment it becomes sticky.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierTable {
    pub high: TierSpec,
    pub mid: TierSpec,
    /// Multiple of the total bet when neither `high` nor `mid` is drawn.
    pub base_multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BonusConfig {
    pub respin_budget: u8,
    /// Chance that an empty slot turns sticky on one respin.
    pub land_probability: f64,
    pub tiers: TierTable,
}

impl BonusConfig {
    pub fn standard() -> Self {
        Self {
            respin_budget: 3,
            land_probability: 0.15,
            tiers: TierTable {
                high: TierSpec {
                    probability: 0.05,
                    multiplier: 40.0,
                },
                mid: TierSpec {
                    probability: 0.15,
                    multiplier: 8.0,
                },
                base_multiplier: 2.0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameConfig {
    pub reels: ReelsConfig,
    pub paylines: Vec<Payline>,
    pub paytable: Paytable,
    /// Trigger symbols needed anywhere on the grid to fire the feature.
    pub trigger_threshold: usize,
    pub payout_policy: PayoutPolicy,
    pub bonus: BonusConfig,
}

impl GameConfig {
    pub fn standard() -> Self {
        Self {
            reels: ReelsConfig::standard(),
            paylines: Payline::standard_set(),
            paytable: Paytable::standard(),
            trigger_threshold: 6,
            payout_policy: PayoutPolicy::HoldAndWin,
            bonus: BonusConfig::standard(),
        }
    }

    pub fn from_json_str(s: &str) -> EngineResult<Self> {
        let config: GameConfig = serde_json::from_str(s)
            .map_err(|e| EngineError::config(format!("invalid game config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| EngineError::config(format!("reading {}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> EngineResult<()> {
        if self.reels.strips.len() != REELS {
            return Err(EngineError::config(format!(
                "expected {REELS} reel strips, got {}",
                self.reels.strips.len()
            )));
        }
        for (i, strip) in self.reels.strips.iter().enumerate() {
            if strip.is_empty() {
                return Err(EngineError::config(format!("reel {} strip is empty", i + 1)));
            }
            if !strip.iter().any(|s| s.is_plain()) {
                return Err(EngineError::config(format!(
                    "reel {} strip has no plain symbols",
                    i + 1
                )));
            }
        }

        if self.paylines.is_empty() {
            return Err(EngineError::config("no paylines configured"));
        }
        for (i, line) in self.paylines.iter().enumerate() {
            if line.0.len() != REELS || line.0.iter().any(|&row| row >= ROWS) {
                return Err(EngineError::config(format!(
                    "payline {} must name one row below {ROWS} for each of {REELS} reels",
                    i + 1
                )));
            }
        }

        self.validate_paytable()?;

        if !(1..=SLOTS).contains(&self.trigger_threshold) {
            return Err(EngineError::config(format!(
                "trigger threshold {} outside 1..={SLOTS}",
                self.trigger_threshold
            )));
        }
        if let PayoutPolicy::ScatterPay { multiplier } = self.payout_policy {
            if !(multiplier.is_finite() && multiplier > 0.0) {
                return Err(EngineError::config("scatter multiplier must be positive"));
            }
        }
        self.validate_bonus()
    }

    fn validate_paytable(&self) -> EngineResult<()> {
        let mut seen = HashSet::new();
        for e in &self.paytable.0 {
            if !e.symbol.is_plain() {
                return Err(EngineError::config(format!(
                    "{:?} never pays on lines and must not be in the paytable",
                    e.symbol
                )));
            }
            if !(MIN_RUN..=REELS as u8).contains(&e.count) {
                return Err(EngineError::config(format!(
                    "{} x{}: run length outside {MIN_RUN}..={REELS}",
                    e.symbol, e.count
                )));
            }
            if !(e.payout_multiplier.is_finite() && e.payout_multiplier > 0.0) {
                return Err(EngineError::config(format!(
                    "{} x{}: multiplier must be positive",
                    e.symbol, e.count
                )));
            }
            if !seen.insert((e.symbol, e.count)) {
                return Err(EngineError::config(format!(
                    "{} x{} listed twice",
                    e.symbol, e.count
                )));
            }
        }
        for s in Symbol::plain() {
            for count in MIN_RUN..=REELS as u8 {
                if !seen.contains(&(s, count)) {
                    return Err(EngineError::config(format!("paytable missing {s} x{count}")));
                }
            }
        }
        Ok(())
    }

    fn validate_bonus(&self) -> EngineResult<()> {
        let b = &self.bonus;
        if b.respin_budget == 0 {
            return Err(EngineError::config("respin budget must be at least 1"));
        }
        let probs = [
            ("land probability", b.land_probability),
            ("high tier probability", b.tiers.high.probability),
            ("mid tier probability", b.tiers.mid.probability),
        ];
        for (name, p) in probs {
            if !(0.0..=1.0).contains(&p) {
                return Err(EngineError::config(format!("{name} {p} outside [0, 1]")));
            }
        }
        if b.tiers.high.probability + b.tiers.mid.probability > 1.0 {
            return Err(EngineError::config("tier probabilities sum above 1"));
        }
        let mults = [
            b.tiers.high.multiplier,
            b.tiers.mid.multiplier,
            b.tiers.base_multiplier,
        ];
        if mults.iter().any(|m| !(m.is_finite() && *m >= 0.0)) {
            return Err(EngineError::config("tier multipliers must be finite and non-negative"));
        }
        Ok(())
    }
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::standard()
    }
}
