/// Which candidate wins when a max reduction sees equal values.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize,
)]
pub enum TieBreak {
    /// The candidate with the lowest index wins, like a stable scan.
    #[default]
    LowestIndex,
    /// The candidate with the highest index wins.
    HighestIndex,
}

impl TieBreak {
    /// Whether `(value, index)` replaces the current best `(best, best_index)` of a max
    /// reduction. NaN values never win.
    pub fn replaces<F: PartialOrd>(
        self,
        value: F,
        index: usize,
        best: F,
        best_index: usize,
    ) -> bool {
        if value > best {
            return true;
        }
        if value != best {
            return false;
        }
        match self {
            TieBreak::LowestIndex => index < best_index,
            TieBreak::HighestIndex => index > best_index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ties_follow_the_rule() {
        assert!(TieBreak::LowestIndex.replaces(1.0, 2, 1.0, 5));
        assert!(!TieBreak::LowestIndex.replaces(1.0, 7, 1.0, 5));
        assert!(TieBreak::HighestIndex.replaces(1.0, 7, 1.0, 5));
        assert!(TieBreak::HighestIndex.replaces(2.0, 0, 1.0, 5));
        assert!(!TieBreak::LowestIndex.replaces(f32::NAN, 0, 1.0, 5));
    }
}
