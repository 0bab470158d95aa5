use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of reels on the machine.
pub const REELS: usize = 5;
/// Visible rows per reel.
pub const ROWS: usize = 3;
/// Visible slots on the grid.
pub const SLOTS: usize = REELS * ROWS;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    A,
    B,
    C,
    D,
    /// Counted anywhere on the grid; drives the Hold & Win feature. Never pays on lines.
    Trigger,
    E,
    F,
    /// Substitutes for any plain symbol on a payline.
    Wild,
}

impl Symbol {
    pub const ALL: [Symbol; 8] = [
        Symbol::A,
        Symbol::B,
        Symbol::C,
        Symbol::D,
        Symbol::Trigger,
        Symbol::E,
        Symbol::F,
        Symbol::Wild,
    ];

    pub fn from_index(i: u8) -> Option<Self> {
        Self::ALL.get(i as usize).copied()
    }

    pub fn to_index(self) -> u8 {
        match self {
            Symbol::A => 0,
            Symbol::B => 1,
            Symbol::C => 2,
            Symbol::D => 3,
            Symbol::Trigger => 4,
            Symbol::E => 5,
            Symbol::F => 6,
            Symbol::Wild => 7,
        }
    }

    /// Plain pay symbols are everything but `Wild` and `Trigger`.
    pub fn is_plain(self) -> bool {
        !matches!(self, Symbol::Wild | Symbol::Trigger)
    }

    pub fn plain() -> impl Iterator<Item = Symbol> {
        Self::ALL.into_iter().filter(|s| s.is_plain())
    }

    fn from_letter(c: char) -> Option<Self> {
        Some(match c {
            'A' => Symbol::A,
            'B' => Symbol::B,
            'C' => Symbol::C,
            'D' => Symbol::D,
            'T' => Symbol::Trigger,
            'E' => Symbol::E,
            'F' => Symbol::F,
            'W' => Symbol::Wild,
            _ => return None,
        })
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Symbol::A => "A",
            Symbol::B => "B",
            Symbol::C => "C",
            Symbol::D => "D",
            Symbol::Trigger => "T",
            Symbol::E => "E",
            Symbol::F => "F",
            Symbol::Wild => "W",
        };
        f.write_str(s)
    }
}

/// Physical reel strips. Repetition of a symbol on a strip is its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReelsConfig {
    pub strips: Vec<Vec<Symbol>>,
}

impl ReelsConfig {
    pub fn standard() -> Self {
        Self {
            strips: vec![
                strip("A F E D T T F C E B W D F E C T D F E A E F D B T E F C D F"),
                strip("B E F D T F E C W A F D E T E F E C D B F E D F A T E C F D E W"),
                strip("C F D E T T F B E D A F E C W D F T E F D C B E T F D E F A C D E F"),
                strip("D E F T C F E B D W F E A D T E E F C D F B E T F D E C F A E D"),
                strip("E D F T T C E F B D A E W F D C E T F E D B F T E F C D E A"),
            ],
        }
    }

    /// Symbol visible at `row` when `reel` stops at `stop`, wrapping around the strip.
    pub fn symbol_at(&self, reel: usize, stop: usize, row: usize) -> Symbol {
        let strip = &self.strips[reel];
        strip[(stop + row) % strip.len()]
    }
}

/// Parses a whitespace separated strip written with one letter per symbol.
/// Only used for the built-in tables, so an unknown letter is a programming error.
pub(crate) fn strip(letters: &str) -> Vec<Symbol> {
    letters
        .split_whitespace()
        .map(|l| {
            let c = l.chars().next().unwrap_or(' ');
            Symbol::from_letter(c).unwrap_or_else(|| panic!("unknown strip letter {l:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_round_trips_for_every_symbol() {
        for s in Symbol::ALL {
            assert_eq!(Symbol::from_index(s.to_index()), Some(s));
        }
        assert_eq!(Symbol::from_index(8), None);
    }

    #[test]
    fn standard_strips_have_uneven_lengths() {
        let reels = ReelsConfig::standard();
        let lens: Vec<usize> = reels.strips.iter().map(Vec::len).collect();
        assert_eq!(lens, vec![30, 32, 34, 32, 30]);
    }

    #[test]
    fn symbol_at_wraps_past_strip_end() {
        let reels = ReelsConfig::standard();
        let last = reels.strips[0].len() - 1;
        assert_eq!(reels.symbol_at(0, last, 0), Symbol::F);
        assert_eq!(reels.symbol_at(0, last, 1), Symbol::A);
        assert_eq!(reels.symbol_at(0, last, 2), Symbol::F);
    }
}
