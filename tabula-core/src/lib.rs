//! Foundational types for learning data-transformation concepts from
//! membership and equivalence queries.
//!
//! This crate knows nothing about the learning loop itself. It provides the
//! vocabulary the engine in `tabula-learning` speaks: [`alphabet::Symbol`]s
//! and [`alphabet::Alphabet`]s (in both the concatenative and the atomic
//! catalog flavour), finite words in the shape of [`word::Class`], the
//! persisted [`dfa::LearnedDfa`] snapshot together with its run semantics,
//! and the [`error::LearningError`] taxonomy.

pub mod math;

mod show;
pub use show::{show_duration, Show};

pub mod alphabet;

pub mod word;

pub mod dfa;

pub mod error;

/// Identifies a learning session in the record store.
pub type SessionId = u32;
/// Identifies a single oracle query in the record store.
pub type QueryId = u64;

/// Re-exports the things one typically needs when working with this crate.
pub mod prelude {
    pub use super::{
        alphabet::{Alphabet, CatalogAlphabet, CharAlphabet, Symbol},
        dfa::LearnedDfa,
        error::{LearningError, LearningResult},
        math,
        show_duration,
        word::Class,
        QueryId, SessionId, Show,
    };
}
