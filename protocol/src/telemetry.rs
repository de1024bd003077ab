use serde::Deserialize;
use serde::Serialize;

/// Which of the preferred-match conditions held for a ranking decision.
///
/// Reported as a bit combination so downstream analysis can distinguish
/// every subset; the individual booleans stay addressable in code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReason {
    /// The pool contained exactly one candidate.
    pub only_connection: bool,
    /// The top candidate runs the document's preferred interpreter.
    pub preferred_interpreter: bool,
    /// The top candidate is an exact match per the active match policy.
    pub exact_match: bool,
    /// Non-Python document whose language equals the top candidate's.
    pub non_python_language_match: bool,
}

impl MatchReason {
    pub fn any(&self) -> bool {
        self.only_connection
            || self.preferred_interpreter
            || self.exact_match
            || self.non_python_language_match
    }

    /// Bit combination, `0` meaning no condition held.
    pub fn bits(&self) -> u8 {
        let mut bits = 0;
        if self.only_connection {
            bits |= 1;
        }
        if self.preferred_interpreter {
            bits |= 2;
        }
        if self.exact_match {
            bits |= 4;
        }
        if self.non_python_language_match {
            bits |= 8;
        }
        bits
    }
}

/// Coarse outcome of one preferred-candidate computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferredOutcome {
    Found,
    NotFound,
}
