//! Persisted records of the learning lifecycle: sessions, oracle queries,
//! hypothesis snapshots and the reference corpus.
//!
//! The store keeps one explicit, creation-ordered query queue per session
//! instead of scanning and sorting on every lookup; "the oldest pending
//! query" is the only access pattern the engine needs. The read-then-create
//! paths are not guarded against concurrent writers — one logical writer per
//! session is an operating assumption of the whole engine.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use tabula_core::{
    dfa::LearnedDfa,
    error::{LearningError, LearningResult},
    math, QueryId, SessionId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionStatus {
    Active,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryKind {
    Membership,
    Equivalence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum QueryStatus {
    Pending,
    Answered,
    Counterexample,
}

/// One run of the learning algorithm.
#[derive(Debug, Clone)]
pub struct LearningSession {
    pub id: SessionId,
    pub name: String,
    /// Free text; the engine appends the run summary here on completion.
    pub description: String,
    /// The category this session is learning to recognize.
    pub concept: String,
    pub status: SessionStatus,
    pub created_at: SystemTime,
    pub updated_at: SystemTime,
}

/// A single question posed to the external oracle. Mutated exactly once,
/// when the answer is recorded.
#[derive(Debug, Clone)]
pub struct OracleQuery {
    pub id: QueryId,
    pub session: SessionId,
    pub kind: QueryKind,
    /// Opaque JSON payload, shaped by the oracle gateway.
    pub payload: String,
    pub response: Option<String>,
    pub status: QueryStatus,
    pub created_at: SystemTime,
}

/// A labeled example from the reference corpus. Immutable once seeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub category: String,
    pub price: f64,
}

/// The in-memory record store backing the engine.
#[derive(Debug)]
pub struct Store {
    sessions: math::Map<SessionId, LearningSession>,
    session_names: math::Bijection<String, SessionId>,
    queries: math::Map<QueryId, OracleQuery>,
    /// Per-session query ids in creation order.
    by_session: math::Map<SessionId, Vec<QueryId>>,
    snapshots: math::Map<SessionId, LearnedDfa>,
    items: Vec<Item>,
    next_session: SessionId,
    next_query: QueryId,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            sessions: math::Map::default(),
            session_names: math::Bijection::new(),
            queries: math::Map::default(),
            by_session: math::Map::default(),
            snapshots: math::Map::default(),
            items: Vec::new(),
            next_session: 0,
            next_query: 0,
        }
    }

    /// Seeds the reference corpus. A store that already has items keeps
    /// them; seeding is idempotent.
    pub fn seed_items(&mut self, items: Vec<Item>) {
        if self.items.is_empty() {
            debug!("seeding {} corpus items", items.len());
            self.items = items;
        }
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Creates a session or returns the existing one with the same name,
    /// which is what lets a caller resume by name.
    pub fn create_session(&mut self, name: &str, concept: &str) -> SessionId {
        if let Some(id) = self.session_names.get_by_left(name) {
            return *id;
        }
        let id = self.next_session;
        self.next_session += 1;
        let now = SystemTime::now();
        self.sessions.insert(
            id,
            LearningSession {
                id,
                name: name.to_string(),
                description: String::new(),
                concept: concept.to_string(),
                status: SessionStatus::Active,
                created_at: now,
                updated_at: now,
            },
        );
        self.session_names.insert(name.to_string(), id);
        self.by_session.insert(id, Vec::new());
        debug!("created session {id} (`{name}`) for concept `{concept}`");
        id
    }

    pub fn session(&self, id: SessionId) -> LearningResult<&LearningSession> {
        self.sessions
            .get(&id)
            .ok_or(LearningError::SessionNotFound(id))
    }

    pub fn session_by_name(&self, name: &str) -> Option<SessionId> {
        self.session_names.get_by_left(name).copied()
    }

    /// Marks the session completed and appends the run summary to its
    /// description.
    pub fn complete_session(&mut self, id: SessionId, summary: &str) -> LearningResult<()> {
        let session = self
            .sessions
            .get_mut(&id)
            .ok_or(LearningError::SessionNotFound(id))?;
        session.status = SessionStatus::Completed;
        if !session.description.is_empty() {
            session.description.push('\n');
        }
        session.description.push_str(summary);
        session.updated_at = SystemTime::now();
        Ok(())
    }

    /// Records a new pending query, unless one of the same kind is already
    /// pending for the session, in which case that one is returned. This is
    /// the existence check that keeps the one-outstanding-question-per-kind
    /// invariant intact.
    pub fn create_query(&mut self, session: SessionId, kind: QueryKind, payload: String) -> QueryId {
        if let Some(pending) = self
            .queries_of(session)
            .find(|q| q.kind == kind && q.status == QueryStatus::Pending)
        {
            trace!("query {} of the same kind is still pending", pending.id);
            return pending.id;
        }
        let id = self.next_query;
        self.next_query += 1;
        self.queries.insert(
            id,
            OracleQuery {
                id,
                session,
                kind,
                payload,
                response: None,
                status: QueryStatus::Pending,
                created_at: SystemTime::now(),
            },
        );
        self.by_session.entry(session).or_default().push(id);
        id
    }

    pub fn query(&self, id: QueryId) -> LearningResult<&OracleQuery> {
        self.queries.get(&id).ok_or(LearningError::QueryNotFound(id))
    }

    /// Attaches a response to a pending query and flips its status; this is
    /// the only mutation path for queries. Answering an already answered
    /// query is a no-op, so re-answers neither duplicate questions nor eat
    /// budget. Returns whether the answer was recorded.
    pub fn answer_query(&mut self, id: QueryId, response: &str) -> LearningResult<bool> {
        let query = self
            .queries
            .get_mut(&id)
            .ok_or(LearningError::QueryNotFound(id))?;
        if query.status != QueryStatus::Pending {
            trace!("query {id} was already answered, ignoring re-answer");
            return Ok(false);
        }
        query.response = Some(response.to_string());
        query.status = match query.kind {
            QueryKind::Membership => QueryStatus::Answered,
            QueryKind::Equivalence if response.trim().eq_ignore_ascii_case("correct") => {
                QueryStatus::Answered
            }
            QueryKind::Equivalence => QueryStatus::Counterexample,
        };
        debug!("query {id} answered as {:?}", query.status);
        Ok(true)
    }

    /// All queries of a session, oldest first.
    pub fn queries_of(&self, session: SessionId) -> impl Iterator<Item = &OracleQuery> + '_ {
        self.by_session
            .get(&session)
            .into_iter()
            .flatten()
            .filter_map(|id| self.queries.get(id))
    }

    /// The oldest still pending query of the session, regardless of kind.
    /// This is what a caller answering questions one at a time sees next.
    pub fn oldest_pending(&self, session: SessionId) -> Option<&OracleQuery> {
        self.queries_of(session)
            .find(|q| q.status == QueryStatus::Pending)
    }

    pub fn has_pending(&self, session: SessionId, kind: QueryKind) -> bool {
        self.queries_of(session)
            .any(|q| q.kind == kind && q.status == QueryStatus::Pending)
    }

    /// How many queries of the kind were ever created for the session; the
    /// budgets are enforced against this number.
    pub fn query_count(&self, session: SessionId, kind: QueryKind) -> usize {
        self.queries_of(session).filter(|q| q.kind == kind).count()
    }

    pub fn latest_of_kind(&self, session: SessionId, kind: QueryKind) -> Option<&OracleQuery> {
        self.queries_of(session).filter(|q| q.kind == kind).last()
    }

    /// Stores the session's current hypothesis, replacing any previous one;
    /// there is never more than one snapshot per session.
    pub fn upsert_snapshot(&mut self, session: SessionId, dfa: LearnedDfa) {
        self.snapshots.insert(session, dfa);
    }

    pub fn snapshot(&self, session: SessionId) -> Option<&LearnedDfa> {
        self.snapshots.get(&session)
    }
}
