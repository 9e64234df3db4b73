//! The error taxonomy of the learning engine.
//!
//! Only the not-found family ever crosses the engine boundary. Malformed
//! payloads and failed hypothesis evaluations are recovered close to where
//! they occur by degrading to a conservative default, so the learning loop
//! always makes progress or terminates.

use thiserror::Error;

use crate::{QueryId, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LearningError {
    #[error("learning session `{0}` does not exist")]
    SessionNotFound(SessionId),
    #[error("oracle query `{0}` does not exist")]
    QueryNotFound(QueryId),
    #[error("no hypothesis has been learned for session `{0}` yet")]
    HypothesisNotFound(SessionId),
    /// A stored query payload or response failed to parse. This is recovered
    /// internally (the query counts as unanswered) and only surfaces in
    /// diagnostics, never across the engine boundary.
    #[error("malformed query payload: {0}")]
    MalformedPayload(String),
}

pub type LearningResult<T> = Result<T, LearningError>;
