use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{
    config::{GameConfig, PayoutPolicy},
    lines::{count_triggers, evaluate, is_bonus_triggered, WinEntry, WinKind},
    rng::{DerivedHash, SpinSeeds},
    symbols::{ReelsConfig, Symbol, REELS, ROWS, SLOTS},
};

/// 5 reels x 3 rows, `index = reel * 3 + row`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grid(pub [Symbol; SLOTS]);

impl Grid {
    pub fn get(&self, reel: usize, row: usize) -> Symbol {
        self.0[reel * ROWS + row]
    }

    pub fn to_indices(&self) -> Vec<u8> {
        self.0.iter().map(|s| s.to_index()).collect()
    }

    /// Wire indices grouped one column per reel, top to bottom.
    pub fn columns(&self) -> Vec<Vec<u8>> {
        self.to_indices().chunks(ROWS).map(<[u8]>::to_vec).collect()
    }

    pub fn from_indices(indices: &[u8]) -> Option<Self> {
        let symbols: Vec<Symbol> = indices
            .iter()
            .map(|i| Symbol::from_index(*i))
            .collect::<Option<_>>()?;
        symbols.try_into().ok().map(Grid)
    }

    /// Rows top to bottom, for display.
    pub fn rows(&self) -> [[Symbol; REELS]; ROWS] {
        let mut out = [[Symbol::A; REELS]; ROWS];
        for (row, line) in out.iter_mut().enumerate() {
            for (reel, cell) in line.iter_mut().enumerate() {
                *cell = self.get(reel, row);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpinOutcome {
    pub derived_hash: String,
    pub grid: Grid,
    pub stop_indices: [usize; REELS],
    /// Line wins plus any scatter pay. Hold & Win value is paid by the bonus session.
    pub total_win: f64,
    pub wins: Vec<WinEntry>,
    pub trigger_count: usize,
    /// A Hold & Win session should be opened from this grid.
    pub bonus_triggered: bool,
}

/// Stop index per reel: the reel's 32-bit hash slice modulo its strip length.
pub fn stop_indices(hash: &DerivedHash, reels: &ReelsConfig) -> [usize; REELS] {
    let mut stops = [0usize; REELS];
    for (reel, stop) in stops.iter_mut().enumerate() {
        let len = reels.strips[reel].len();
        *stop = (hash.reel_slice(reel) as u64 % len as u64) as usize;
    }
    stops
}

/// Three consecutive strip positions per reel starting at each stop, wrapping around.
pub fn compute_reel_window(stops: &[usize; REELS], reels: &ReelsConfig) -> Grid {
    let mut grid = [Symbol::A; SLOTS];
    for (reel, stop) in stops.iter().enumerate() {
        for row in 0..ROWS {
            grid[reel * ROWS + row] = reels.symbol_at(reel, *stop, row);
        }
    }
    Grid(grid)
}

/// Visible window and the stops that produced it.
pub fn derive_grid(hash: &DerivedHash, reels: &ReelsConfig) -> (Grid, [usize; REELS]) {
    let stops = stop_indices(hash, reels);
    (compute_reel_window(&stops, reels), stops)
}

/// One base-game spin. Pure: the same seeds, bet and config always give the same outcome.
pub fn spin(seeds: &SpinSeeds, bet: f64, config: &GameConfig) -> SpinOutcome {
    let hash = seeds.derived_hash();
    let (grid, stops) = derive_grid(&hash, &config.reels);

    let mut eval = evaluate(&grid, &config.paylines, &config.paytable, bet);
    let trigger_count = count_triggers(&grid);
    let triggered = is_bonus_triggered(trigger_count, config.trigger_threshold);

    let bonus_triggered = match config.payout_policy {
        PayoutPolicy::HoldAndWin => triggered,
        PayoutPolicy::ScatterPay { multiplier } => {
            if triggered {
                let payout = bet * multiplier;
                eval.wins.push(WinEntry {
                    kind: WinKind::Scatter,
                    payline: None,
                    symbol: Symbol::Trigger,
                    run_length: trigger_count,
                    payout,
                });
                eval.total_win += payout;
            }
            false
        }
    };

    debug!(
        nonce = seeds.nonce,
        total_win = eval.total_win,
        trigger_count,
        bonus_triggered,
        "spin evaluated"
    );

    SpinOutcome {
        derived_hash: hash.to_hex(),
        grid,
        stop_indices: stops,
        total_win: eval.total_win,
        wins: eval.wins,
        trigger_count,
        bonus_triggered,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spin_deterministic() {
        let config = GameConfig::standard();
        let seeds = SpinSeeds::new("server", "client", 1);
        let out1 = spin(&seeds, 1.0, &config);
        let out2 = spin(&seeds, 1.0, &config);
        assert_eq!(out1, out2);
    }

    #[test]
    fn columns_follow_reels() {
        let config = GameConfig::standard();
        let out = spin(&SpinSeeds::new("server", "client", 1), 1.0, &config);
        let columns = out.grid.columns();
        assert_eq!(columns.len(), REELS);
        for (reel, column) in columns.iter().enumerate() {
            let expected: Vec<u8> = (0..ROWS)
                .map(|row| out.grid.get(reel, row).to_index())
                .collect();
            assert_eq!(*column, expected);
        }
    }

    #[test]
    fn stops_respect_each_strip_length() {
        let config = GameConfig::standard();
        for nonce in 0..500 {
            let hash = SpinSeeds::new("s", "c", nonce).derived_hash();
            let (_, stops) = derive_grid(&hash, &config.reels);
            for (reel, stop) in stops.iter().enumerate() {
                assert!(*stop < config.reels.strips[reel].len());
            }
        }
    }

    #[test]
    fn window_is_three_consecutive_strip_positions() {
        let reels = ReelsConfig::standard();
        let stops = [29, 0, 33, 31, 5];
        let grid = compute_reel_window(&stops, &reels);
        for (reel, stop) in stops.iter().enumerate() {
            let strip = &reels.strips[reel];
            for row in 0..ROWS {
                assert_eq!(grid.get(reel, row), strip[(stop + row) % strip.len()]);
            }
        }
    }

    #[test]
    fn scatter_policy_pays_once_and_never_opens_bonus() {
        let mut config = GameConfig::standard();
        config.payout_policy = PayoutPolicy::ScatterPay { multiplier: 10.0 };
        config.trigger_threshold = 1;
        let found = (0..2_000u64)
            .map(|n| spin(&SpinSeeds::new("scatter", "c", n), 5.0, &config))
            .find(|o| o.trigger_count >= 1)
            .expect("a trigger symbol lands within 2000 spins");
        assert!(!found.bonus_triggered);
        let scatters: Vec<_> = found
            .wins
            .iter()
            .filter(|w| w.kind == WinKind::Scatter)
            .collect();
        assert_eq!(scatters.len(), 1);
        assert_eq!(scatters[0].payout, 50.0);
        assert_eq!(scatters[0].run_length, found.trigger_count);
        let lines: f64 = found
            .wins
            .iter()
            .filter(|w| w.kind == WinKind::Line)
            .map(|w| w.payout)
            .sum();
        assert_eq!(found.total_win, lines + 50.0);
    }

    #[test]
    fn grid_index_round_trip() {
        let hash = SpinSeeds::new("s", "c", 3).derived_hash();
        let (grid, _) = derive_grid(&hash, &ReelsConfig::standard());
        assert_eq!(Grid::from_indices(&grid.to_indices()), Some(grid));
        assert_eq!(Grid::from_indices(&[0; 14]), None);
        assert_eq!(Grid::from_indices(&[9; 15]), None);
    }
}
