use crate::symbols::{Symbol, REELS, ROWS};
use serde::{Deserialize, Serialize};

/// Shortest run that pays on a line.
pub const MIN_RUN: u8 = 3;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaytableEntry {
    pub symbol: Symbol,
    pub count: u8,
    /// Multiple of the per-line stake.
    pub payout_multiplier: f64,
}

/// Line pays for plain symbols.
///
/// A line made entirely of wilds pays as [`Paytable::wild_fallback`], the lowest paying
/// plain symbol, rather than having its own row in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Paytable(pub Vec<PaytableEntry>);

impl Paytable {
    pub fn standard() -> Self {
        let rows: [(Symbol, [f64; 3]); 6] = [
            (Symbol::A, [25.0, 100.0, 400.0]),
            (Symbol::B, [20.0, 75.0, 250.0]),
            (Symbol::C, [15.0, 50.0, 150.0]),
            (Symbol::D, [10.0, 30.0, 100.0]),
            (Symbol::E, [6.0, 20.0, 60.0]),
            (Symbol::F, [5.0, 12.0, 40.0]),
        ];
        Self(
            rows.iter()
                .flat_map(|(symbol, pays)| {
                    pays.iter().zip(MIN_RUN..).map(move |(m, count)| PaytableEntry {
                        symbol: *symbol,
                        count,
                        payout_multiplier: *m,
                    })
                })
                .collect(),
        )
    }

    pub fn multiplier(&self, symbol: Symbol, count: u8) -> Option<f64> {
        self.0
            .iter()
            .find(|e| e.symbol == symbol && e.count == count)
            .map(|e| e.payout_multiplier)
    }

    /// Anchor for an all-wild line: the plain symbol with the smallest five-of-a-kind pay,
    /// ties going to the lower wire index.
    pub fn wild_fallback(&self) -> Option<Symbol> {
        Symbol::plain()
            .filter_map(|s| self.multiplier(s, REELS as u8).map(|m| (s, m)))
            .min_by(|(sa, ma), (sb, mb)| ma.total_cmp(mb).then(sa.to_index().cmp(&sb.to_index())))
            .map(|(s, _)| s)
    }
}

/// Row index on each reel, left to right.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Payline(pub Vec<usize>);

impl Payline {
    pub fn standard_set() -> Vec<Payline> {
        vec![
            Payline(vec![1, 1, 1, 1, 1]),
            Payline(vec![0, 0, 0, 0, 0]),
            Payline(vec![2, 2, 2, 2, 2]),
            Payline(vec![0, 1, 2, 1, 0]),
            Payline(vec![2, 1, 0, 1, 2]),
        ]
    }

    /// Grid slot indices visited by this line.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.0.iter().enumerate().map(|(reel, row)| reel * ROWS + row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_covers_every_plain_symbol() {
        let table = Paytable::standard();
        for s in Symbol::plain() {
            for count in MIN_RUN..=REELS as u8 {
                assert!(table.multiplier(s, count).is_some(), "{s} x{count}");
            }
        }
        assert_eq!(table.multiplier(Symbol::Wild, 5), None);
        assert_eq!(table.multiplier(Symbol::Trigger, 3), None);
        assert_eq!(table.multiplier(Symbol::A, 2), None);
    }

    #[test]
    fn wild_fallback_is_lowest_paying_plain_symbol() {
        assert_eq!(Paytable::standard().wild_fallback(), Some(Symbol::F));
    }

    #[test]
    fn wild_fallback_tie_goes_to_lower_index() {
        let table = Paytable(vec![
            PaytableEntry {
                symbol: Symbol::D,
                count: 5,
                payout_multiplier: 10.0,
            },
            PaytableEntry {
                symbol: Symbol::B,
                count: 5,
                payout_multiplier: 10.0,
            },
        ]);
        assert_eq!(table.wild_fallback(), Some(Symbol::B));
    }

    #[test]
    fn v_shape_slots() {
        let v = &Payline::standard_set()[3];
        assert_eq!(v.slots().collect::<Vec<_>>(), vec![0, 4, 8, 10, 12]);
    }
}
