//! Active learning of data-transformation concepts from labeled examples
//! and oracle queries.
//!
//! The heart of this crate is the [`active`] module: an L*-style learner that
//! maintains an observation table, poses membership and equivalence queries
//! to an [`active::Oracle`], and extracts DFA hypotheses until the oracle is
//! satisfied or the query budgets run out. Queries that no backend can answer
//! immediately are persisted through [`store`] and the learner suspends until
//! an external answer arrives; [`engine::Engine`] is the surface collaborators
//! drive this lifecycle through.
//!
//! The [`transform`] module carries the alternate hypothesis representation:
//! instead of an automaton, a candidate is a sequence of closed transformation
//! primitives with an explicit interpreter and a replay-based confidence.

pub mod active;

pub mod corpus;

pub mod engine;

pub mod store;

pub mod transform;

/// Re-exports the commonly used pieces of this crate and its core.
pub mod prelude {
    pub use tabula_core::prelude::*;

    pub use crate::active::{
        build_hypothesis, evaluate, CorpusOracle, EngineOracle, Equivalence, Evaluation,
        HybridOracle, LStar, LStarConfig, ObservationTable, Oracle, Phase, RunOutcome,
        SessionOracle, TableMode,
    };
    pub use crate::engine::{
        Engine, HypothesisView, OracleMode, QueryView, RunStep, SessionMetrics,
    };
    pub use crate::store::{
        Item, LearningSession, OracleQuery, QueryKind, QueryStatus, SessionStatus, Store,
    };
    pub use crate::transform::{Candidate, CandidateStatus, Record, Transform, TransformOp, Value};
}
