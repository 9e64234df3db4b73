//! The externally visible learning result: a DFA-like snapshot of the
//! current belief about the target concept.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::math;

/// A deterministic finite automaton extracted from an observation table.
///
/// States are named by the encoded access string of the row they were
/// promoted from; the empty string names the initial state. The structure is
/// deliberately stringly typed so that one snapshot per session can be
/// persisted and compared structurally, independent of the alphabet mode the
/// session ran in.
///
/// The transition function is partial: running into a missing transition
/// rejects, so everything outside the learned state space is rejected
/// implicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnedDfa {
    /// State names in the order they were promoted into the base.
    pub states: Vec<String>,
    /// All symbols the automaton knows about, rendered through `Show`.
    pub alphabet: math::Set<String>,
    /// `state → (symbol → state)`.
    pub transitions: math::Map<String, math::Map<String, String>>,
    /// Name of the initial state.
    pub initial: String,
    /// Names of the accepting states.
    pub accepting: math::Set<String>,
}

impl LearnedDfa {
    /// Number of states.
    pub fn size(&self) -> usize {
        self.states.len()
    }

    /// Runs the automaton on the given symbol sequence, returning the name of
    /// the reached state. `None` means the run fell off the transition
    /// function, which callers treat as rejection.
    pub fn run<I, W>(&self, word: I) -> Option<&String>
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        let mut current = self.states.iter().find(|s| **s == self.initial)?;
        for sym in word {
            let Some(next) = self.transitions.get(current).and_then(|succ| succ.get(sym.as_ref()))
            else {
                trace!("no transition from `{current}` on `{}`, rejecting", sym.as_ref());
                return None;
            };
            current = next;
        }
        Some(current)
    }

    /// Whether the automaton accepts the given symbol sequence.
    pub fn accepts<I, W>(&self, word: I) -> bool
    where
        I: IntoIterator<Item = W>,
        W: AsRef<str>,
    {
        self.run(word)
            .map(|state| self.accepting.contains(state))
            .unwrap_or(false)
    }

    /// Whether the named state is accepting.
    pub fn is_accepting(&self, state: &str) -> bool {
        self.accepting.contains(state)
    }
}

impl std::fmt::Display for LearnedDfa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "DFA with {} states over {} symbols",
            self.size(),
            self.alphabet.len()
        )?;
        for state in &self.states {
            let name = if state.is_empty() { "ε" } else { state };
            let marker = match (state == &self.initial, self.is_accepting(state)) {
                (true, true) => "→*",
                (true, false) => "→ ",
                (false, true) => " *",
                (false, false) => "  ",
            };
            let successors = self
                .transitions
                .get(state)
                .map(|succ| {
                    succ.iter()
                        .map(|(sym, target)| {
                            format!("{} ⇒ {}", sym, if target.is_empty() { "ε" } else { target })
                        })
                        .join(", ")
                })
                .unwrap_or_default();
            writeln!(f, "{} {} | {}", marker, name, successors)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn even_as() -> LearnedDfa {
        let mut transitions: math::Map<String, math::Map<String, String>> = math::Map::default();
        transitions.insert(
            "".to_string(),
            [("a".to_string(), "a".to_string())].into_iter().collect(),
        );
        transitions.insert(
            "a".to_string(),
            [("a".to_string(), "".to_string())].into_iter().collect(),
        );
        LearnedDfa {
            states: vec!["".to_string(), "a".to_string()],
            alphabet: ["a".to_string()].into_iter().collect(),
            transitions,
            initial: "".to_string(),
            accepting: ["".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn runs_and_accepts() {
        let dfa = even_as();
        assert!(dfa.accepts(Vec::<&str>::new()));
        assert!(!dfa.accepts(["a"]));
        assert!(dfa.accepts(["a", "a"]));
        // unknown symbols fall off the partial transition function
        assert!(!dfa.accepts(["b"]));
    }

    #[test]
    fn serde_roundtrip_is_structural() {
        let dfa = even_as();
        let json = serde_json::to_string(&dfa).unwrap();
        let back: LearnedDfa = serde_json::from_str(&json).unwrap();
        assert_eq!(dfa, back);
    }
}
