//! Payline and scatter evaluation.

use serde::{Deserialize, Serialize};

use crate::engine::Grid;
use crate::paytable::{Payline, Paytable, MIN_RUN};
use crate::symbols::Symbol;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinKind {
    Line,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WinEntry {
    pub kind: WinKind,
    /// 1-based payline id for line wins.
    pub payline: Option<usize>,
    pub symbol: Symbol,
    /// Consecutive reels for a line win, symbols on the grid for a scatter win.
    pub run_length: usize,
    pub payout: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LineEvaluation {
    pub total_win: f64,
    pub wins: Vec<WinEntry>,
}

/// Symbol a line is evaluated for.
///
/// A leading wild takes the first symbol on the line that is neither wild nor trigger. A
/// line of nothing but wilds takes the paytable's fallback. `None` (or a trigger) means the
/// line cannot pay.
pub fn line_anchor(symbols: &[Symbol], paytable: &Paytable) -> Option<Symbol> {
    match symbols.first()? {
        Symbol::Wild if symbols.iter().all(|s| *s == Symbol::Wild) => paytable.wild_fallback(),
        Symbol::Wild => symbols.iter().copied().find(|s| s.is_plain()),
        first => Some(*first),
    }
}

/// Length of the left-to-right run of `anchor` or wild.
pub fn run_length(symbols: &[Symbol], anchor: Symbol) -> usize {
    symbols
        .iter()
        .take_while(|s| **s == anchor || **s == Symbol::Wild)
        .count()
}

fn evaluate_line(
    id: usize,
    symbols: &[Symbol],
    paytable: &Paytable,
    line_stake: f64,
) -> Option<WinEntry> {
    let anchor = line_anchor(symbols, paytable).filter(|s| *s != Symbol::Trigger)?;
    let run = run_length(symbols, anchor);
    if run < MIN_RUN as usize {
        return None;
    }
    let multiplier = paytable.multiplier(anchor, run as u8)?;
    Some(WinEntry {
        kind: WinKind::Line,
        payline: Some(id),
        symbol: anchor,
        run_length: run,
        payout: line_stake * multiplier,
    })
}

/// Line wins for `bet` spread evenly across `paylines`. Scatter pays are not included.
pub fn evaluate(
    grid: &Grid,
    paylines: &[Payline],
    paytable: &Paytable,
    bet: f64,
) -> LineEvaluation {
    if paylines.is_empty() {
        return LineEvaluation::default();
    }
    let line_stake = bet / paylines.len() as f64;
    let wins: Vec<WinEntry> = paylines
        .iter()
        .enumerate()
        .filter_map(|(i, line)| {
            let symbols: Vec<Symbol> = line.slots().map(|slot| grid.0[slot]).collect();
            evaluate_line(i + 1, &symbols, paytable, line_stake)
        })
        .collect();
    LineEvaluation {
        total_win: wins.iter().map(|w| w.payout).sum(),
        wins,
    }
}

/// Trigger symbols anywhere on the grid.
pub fn count_triggers(grid: &Grid) -> usize {
    grid.0.iter().filter(|s| **s == Symbol::Trigger).count()
}

pub fn is_bonus_triggered(count: usize, threshold: usize) -> bool {
    count >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::{ROWS, SLOTS};
    use Symbol::*;

    /// Grid whose middle row is `middle`; every other slot is filler that never lines up.
    fn grid_with_middle_row(middle: [Symbol; 5]) -> Grid {
        let filler = [C, D, E, C, D];
        let mut slots = [A; SLOTS];
        for reel in 0..5 {
            slots[reel * ROWS] = filler[reel];
            slots[reel * ROWS + 1] = middle[reel];
            slots[reel * ROWS + 2] = filler[(reel + 2) % 5];
        }
        Grid(slots)
    }

    fn middle_line() -> Vec<Payline> {
        vec![Payline(vec![1, 1, 1, 1, 1])]
    }

    #[test]
    fn three_of_a_kind_then_break() {
        let grid = grid_with_middle_row([A, A, A, B, B]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert_eq!(eval.wins.len(), 1);
        assert_eq!(eval.wins[0].symbol, A);
        assert_eq!(eval.wins[0].run_length, 3);
        assert_eq!(eval.total_win, 25.0);
    }

    #[test]
    fn leading_wild_pays_as_five_of_anchor() {
        let grid = grid_with_middle_row([Wild, A, A, A, A]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert_eq!(eval.wins[0].symbol, A);
        assert_eq!(eval.wins[0].run_length, 5);
        assert_eq!(eval.total_win, 400.0);
    }

    #[test]
    fn all_wild_line_pays_fallback_symbol() {
        let grid = grid_with_middle_row([Wild; 5]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert_eq!(eval.wins[0].symbol, F);
        assert_eq!(eval.wins[0].run_length, 5);
        assert_eq!(eval.total_win, 40.0);
    }

    #[test]
    fn stake_is_split_across_paylines() {
        let grid = grid_with_middle_row([A, A, A, B, B]);
        let five_lines = Payline::standard_set();
        let eval = evaluate(&grid, &five_lines, &Paytable::standard(), 5.0);
        let middle = eval.wins.iter().find(|w| w.payline == Some(1)).unwrap();
        assert_eq!(middle.payout, 25.0);
    }

    #[test]
    fn trigger_never_anchors_a_line() {
        let grid = grid_with_middle_row([Trigger, Trigger, Trigger, Trigger, Trigger]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert!(eval.wins.is_empty());
    }

    #[test]
    fn wilds_then_only_triggers_cannot_resolve() {
        let line = [Wild, Wild, Trigger, Trigger, Trigger];
        assert_eq!(line_anchor(&line, &Paytable::standard()), None);
        let grid = grid_with_middle_row(line);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert!(eval.wins.is_empty());
    }

    #[test]
    fn leading_wild_skips_trigger_when_resolving_anchor() {
        let line = [Wild, Trigger, B, B, B];
        assert_eq!(line_anchor(&line, &Paytable::standard()), Some(B));
        // The trigger on reel 2 still breaks the run.
        assert_eq!(run_length(&line, B), 1);
    }

    #[test]
    fn run_below_three_pays_nothing() {
        let grid = grid_with_middle_row([A, A, B, A, A]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert!(eval.wins.is_empty());
    }

    #[test]
    fn runs_only_count_from_the_left() {
        let grid = grid_with_middle_row([B, A, A, A, A]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert!(eval.wins.is_empty());
    }

    #[test]
    fn wild_mid_run_extends_match() {
        let grid = grid_with_middle_row([C, Wild, C, Wild, D]);
        let eval = evaluate(&grid, &middle_line(), &Paytable::standard(), 1.0);
        assert_eq!(eval.wins[0].symbol, C);
        assert_eq!(eval.wins[0].run_length, 4);
        assert_eq!(eval.total_win, 50.0);
    }

    #[test]
    fn trigger_count_threshold_boundary() {
        let threshold = 6;
        let mut slots = [A; SLOTS];
        for slot in slots.iter_mut().take(threshold - 1) {
            *slot = Trigger;
        }
        let below = Grid(slots);
        assert_eq!(count_triggers(&below), threshold - 1);
        assert!(!is_bonus_triggered(count_triggers(&below), threshold));

        slots[SLOTS - 1] = Trigger;
        let at = Grid(slots);
        assert_eq!(count_triggers(&at), threshold);
        assert!(is_bonus_triggered(count_triggers(&at), threshold));
    }
}
