//! Pass numbering and per-pass state.
//!
//! The backend analyses a paper in three sequential passes: a first skim
//! (structure and the "five C's"), a second read (figures, evidence,
//! concepts) and a deep third read (re-implementation, assumptions,
//! critique). A [`PassNumber`] can only ever hold 1, 2 or 3.

use crate::error::AnalyzerError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three analysis passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PassNumber(u8);

impl PassNumber {
    pub const FIRST: PassNumber = PassNumber(1);
    pub const SECOND: PassNumber = PassNumber(2);
    pub const THIRD: PassNumber = PassNumber(3);

    /// All passes in request order.
    pub const ALL: [PassNumber; 3] = [Self::FIRST, Self::SECOND, Self::THIRD];

    /// Validate a raw pass number.
    pub fn new(n: u8) -> Result<Self, AnalyzerError> {
        match n {
            1..=3 => Ok(PassNumber(n)),
            other => Err(AnalyzerError::InvalidPass(other)),
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// The pass that must be fulfilled before this one unlocks.
    pub fn previous(self) -> Option<PassNumber> {
        match self.0 {
            1 => None,
            n => Some(PassNumber(n - 1)),
        }
    }

    /// Zero-based slot in per-pass arrays.
    pub(crate) fn index(self) -> usize {
        usize::from(self.0 - 1)
    }

    /// Short human title used in rendered reports.
    pub fn title(self) -> &'static str {
        match self.0 {
            1 => "First pass",
            2 => "Second pass",
            _ => "Third pass",
        }
    }
}

impl TryFrom<u8> for PassNumber {
    type Error = AnalyzerError;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        PassNumber::new(n)
    }
}

impl From<PassNumber> for u8 {
    fn from(p: PassNumber) -> u8 {
        p.0
    }
}

impl fmt::Display for PassNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a single pass within the current document.
///
/// There is deliberately no `Failed` state: a failed request returns the
/// pass to `NotRequested` so it can simply be triggered again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PassState {
    #[default]
    NotRequested,
    Pending,
    Fulfilled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_only_one_to_three() {
        assert!(PassNumber::new(0).is_err());
        assert_eq!(PassNumber::new(1).unwrap(), PassNumber::FIRST);
        assert_eq!(PassNumber::new(3).unwrap(), PassNumber::THIRD);
        assert!(matches!(
            PassNumber::new(4),
            Err(AnalyzerError::InvalidPass(4))
        ));
    }

    #[test]
    fn previous_pass_chain() {
        assert_eq!(PassNumber::FIRST.previous(), None);
        assert_eq!(PassNumber::SECOND.previous(), Some(PassNumber::FIRST));
        assert_eq!(PassNumber::THIRD.previous(), Some(PassNumber::SECOND));
    }

    #[test]
    fn serde_rejects_out_of_range() {
        let ok: PassNumber = serde_json::from_str("2").unwrap();
        assert_eq!(ok, PassNumber::SECOND);
        assert!(serde_json::from_str::<PassNumber>("7").is_err());
    }
}
