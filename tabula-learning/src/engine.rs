//! The operation surface collaborators drive the learning lifecycle through:
//! start a session, answer the oldest pending query, read the current
//! hypothesis and the session metrics.
//!
//! Every call rebuilds the session's learner wholesale from the persisted
//! query history, runs it until it converges or suspends on an unanswered
//! question, and hands control back. Only the not-found family of errors
//! crosses this boundary; everything else degrades to conservative defaults
//! inside the loop.

use itertools::Itertools;
use tracing::{debug, info, warn};

use tabula_core::{
    alphabet::{Alphabet, CatalogAlphabet, CharAlphabet},
    dfa::LearnedDfa,
    error::{LearningError, LearningResult},
    math, QueryId, SessionId,
};

use crate::{
    active::{
        evaluate, parse_bool_response, seed_sample, CorpusOracle, EngineOracle, HybridOracle,
        LStar, LStarConfig, MembershipPayload, ObservationTable, RunOutcome, SessionOracle,
        TableMode,
    },
    corpus,
    store::{Item, OracleQuery, QueryKind, QueryStatus, SessionStatus, Store},
};

/// Which membership-answering capability a session's learner is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OracleMode {
    /// All answers come from the seeded corpus; learning is fully automatic.
    Corpus,
    /// All answers come from an external oracle via persisted queries.
    Human,
    /// Corpus lookup for catalog words, the external oracle for the rest.
    Hybrid,
}

/// A pending question, as handed to the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryView {
    pub id: QueryId,
    pub kind: QueryKind,
    pub payload: String,
}

impl From<&OracleQuery> for QueryView {
    fn from(query: &OracleQuery) -> Self {
        Self {
            id: query.id,
            kind: query.kind,
            payload: query.payload.clone(),
        }
    }
}

/// What a caller gets back from every lifecycle operation: either the next
/// question to answer or the final result.
#[derive(Debug, Clone, PartialEq)]
pub struct RunStep {
    pub session: SessionId,
    pub current_query: Option<QueryView>,
    pub is_complete: bool,
    pub final_result: Option<String>,
}

/// The externally visible shape of the current hypothesis.
#[derive(Debug, Clone, PartialEq)]
pub struct HypothesisView {
    pub states: Vec<String>,
    pub alphabet: Vec<String>,
    pub transitions: math::Map<String, math::Map<String, String>>,
    pub start_state: String,
    pub accept_states: Vec<String>,
    pub target_concept: String,
}

/// Query bookkeeping of a session.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionMetrics {
    pub total_queries: usize,
    pub membership_queries: usize,
    pub equivalence_queries: usize,
    pub has_hypothesis: bool,
    pub snapshot: Option<LearnedDfa>,
}

/// Owns the record store and drives one learner per session. Sessions are
/// independent; a learner exists only for the duration of one call and is
/// rebuilt from the query history on the next, which keeps resumption
/// idempotent.
#[derive(Debug)]
pub struct Engine {
    store: Store,
    config: LStarConfig,
    mode: OracleMode,
}

impl Engine {
    /// An engine over the demo corpus.
    pub fn new(config: LStarConfig, mode: OracleMode) -> Self {
        Self::with_items(config, mode, corpus::demo_items())
    }

    /// An engine over a caller-provided corpus.
    pub fn with_items(config: LStarConfig, mode: OracleMode, items: Vec<Item>) -> Self {
        let mut store = Store::new();
        store.seed_items(items);
        Self {
            store,
            config,
            mode,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Starts (or resumes, when the name is known) a learning session for
    /// the given target concept and runs it as far as the oracle allows.
    pub fn start_learning(&mut self, name: &str, concept: &str) -> LearningResult<RunStep> {
        let session = self.store.create_session(name, concept);
        info!("starting learning session {session} (`{name}`) for concept `{concept}`");
        self.advance(session)
    }

    /// Answers the session's oldest pending query and continues learning.
    pub fn answer_query(&mut self, session: SessionId, response: &str) -> LearningResult<RunStep> {
        self.store.session(session)?;
        if let Some(id) = self.store.oldest_pending(session).map(|q| q.id) {
            self.store.answer_query(id, response)?;
        } else {
            debug!("session {session} has no pending query, continuing anyway");
        }
        self.advance(session)
    }

    /// Answers a specific query. Re-answering an already answered query is a
    /// no-op, so calling this twice neither duplicates questions nor eats
    /// budget.
    pub fn answer_query_by_id(
        &mut self,
        session: SessionId,
        query: QueryId,
        response: &str,
    ) -> LearningResult<RunStep> {
        self.store.session(session)?;
        self.store.answer_query(query, response)?;
        self.advance(session)
    }

    /// Re-runs the session from its persisted query history. Safe to call
    /// any number of times; with no new answers in between, the resulting
    /// state is identical.
    pub fn resume(&mut self, session: SessionId) -> LearningResult<RunStep> {
        self.advance(session)
    }

    /// The current hypothesis snapshot of the session.
    pub fn current_hypothesis(&self, session: SessionId) -> LearningResult<HypothesisView> {
        let sess = self.store.session(session)?;
        let dfa = self
            .store
            .snapshot(session)
            .ok_or(LearningError::HypothesisNotFound(session))?;
        Ok(HypothesisView {
            states: dfa.states.clone(),
            alphabet: dfa.alphabet.iter().cloned().collect(),
            transitions: dfa.transitions.clone(),
            start_state: dfa.initial.clone(),
            accept_states: dfa.accepting.iter().cloned().collect(),
            target_concept: sess.concept.clone(),
        })
    }

    /// Query bookkeeping of the session.
    pub fn metrics(&self, session: SessionId) -> LearningResult<SessionMetrics> {
        self.store.session(session)?;
        let membership_queries = self.store.query_count(session, QueryKind::Membership);
        let equivalence_queries = self.store.query_count(session, QueryKind::Equivalence);
        let snapshot = self.store.snapshot(session).cloned();
        Ok(SessionMetrics {
            total_queries: membership_queries + equivalence_queries,
            membership_queries,
            equivalence_queries,
            has_hypothesis: snapshot.is_some(),
            snapshot,
        })
    }

    fn advance(&mut self, session: SessionId) -> LearningResult<RunStep> {
        let items = self.store.items().to_vec();
        match self.config.mode {
            TableMode::Atomic => {
                let alphabet = CatalogAlphabet::new(items.iter().map(|item| item.name.clone()));
                self.advance_with(session, alphabet)
            }
            TableMode::Chars => {
                let alphabet = CharAlphabet::from_words(items.iter().map(|item| item.name.as_str()));
                self.advance_with(session, alphabet)
            }
        }
    }

    fn advance_with<A: Alphabet>(
        &mut self,
        session: SessionId,
        alphabet: A,
    ) -> LearningResult<RunStep> {
        let sess = self.store.session(session)?.clone();
        if sess.status == SessionStatus::Completed {
            debug!("session {session} is already completed");
            return Ok(RunStep {
                session,
                current_query: None,
                is_complete: true,
                final_result: Some(sess.description),
            });
        }

        // rehydrate the table wholesale from the persisted query history
        let mut candidates = Vec::new();
        let mut answers = Vec::new();
        let mut counterexamples = Vec::new();
        for query in self.store.queries_of(session) {
            match query.kind {
                QueryKind::Membership => {
                    match serde_json::from_str::<MembershipPayload>(&query.payload) {
                        Ok(payload) => match alphabet.decode(&payload.candidate) {
                            Some(word) => {
                                if query.status == QueryStatus::Answered {
                                    if let Some(response) = &query.response {
                                        answers.push((word.clone(), parse_bool_response(response)));
                                    }
                                }
                                candidates.push(word);
                            }
                            None => warn!(
                                "candidate `{}` is not a word over the alphabet",
                                payload.candidate
                            ),
                        },
                        Err(err) => {
                            warn!("skipping query {} with malformed payload: {err}", query.id)
                        }
                    }
                }
                QueryKind::Equivalence => {
                    if query.status == QueryStatus::Counterexample {
                        if let Some(response) = &query.response {
                            match alphabet.decode(response.trim()) {
                                Some(word) => counterexamples.push(word),
                                None => warn!(
                                    "counterexample `{response}` is not a word over the alphabet"
                                ),
                            }
                        }
                    }
                }
            }
        }

        // a fresh character-mode session seeds its base from a bounded
        // random sample of the corpus
        if candidates.is_empty() && !alphabet.is_atomic() {
            let corpus_words = self
                .store
                .items()
                .iter()
                .filter_map(|item| alphabet.decode(&item.name))
                .collect_vec();
            let bound = self
                .config
                .initial_sample
                .min(self.config.max_membership_queries);
            candidates = seed_sample(&corpus_words, bound, &mut rand::thread_rng());
        }

        let table = ObservationTable::rehydrate(
            alphabet.clone(),
            candidates,
            answers,
            counterexamples,
        );
        let items = self.store.items().to_vec();
        let oracle = match self.mode {
            OracleMode::Corpus => EngineOracle::Corpus(CorpusOracle::from_items(
                alphabet.clone(),
                &items,
                &sess.concept,
            )),
            OracleMode::Human => EngineOracle::Human(SessionOracle::new(
                alphabet.clone(),
                &mut self.store,
                session,
                &sess.concept,
                self.config.max_membership_queries,
                self.config.max_equivalence_queries,
            )),
            OracleMode::Hybrid => EngineOracle::Hybrid(HybridOracle::new(
                CorpusOracle::from_items(alphabet.clone(), &items, &sess.concept),
                SessionOracle::new(
                    alphabet.clone(),
                    &mut self.store,
                    session,
                    &sess.concept,
                    self.config.max_membership_queries,
                    self.config.max_equivalence_queries,
                ),
            )),
        };

        let mut learner = LStar::new(table, oracle);
        let outcome = learner.run();
        drop(learner);

        match outcome {
            RunOutcome::Converged(dfa) => {
                let labeled = self
                    .store
                    .items()
                    .iter()
                    .filter_map(|item| {
                        alphabet
                            .decode(&item.name)
                            .map(|word| (word, item.category == sess.concept))
                    })
                    .collect_vec();
                let evaluation = evaluate(&dfa, &labeled);
                let summary = format!(
                    "learned a {}-state hypothesis for concept `{}`; replay accuracy {}",
                    dfa.size(),
                    sess.concept,
                    evaluation
                );
                info!("session {session} converged: {summary}");
                self.store.upsert_snapshot(session, dfa);
                self.store.complete_session(session, &summary)?;
                Ok(RunStep {
                    session,
                    current_query: None,
                    is_complete: true,
                    final_result: Some(summary),
                })
            }
            RunOutcome::AwaitingOracle(dfa) => {
                self.store.upsert_snapshot(session, dfa);
                let current_query = self.store.oldest_pending(session).map(QueryView::from);
                Ok(RunStep {
                    session,
                    current_query,
                    is_complete: false,
                    final_result: None,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(name: &str, category: &str, price: f64) -> Item {
        Item {
            name: name.to_string(),
            category: category.to_string(),
            price,
        }
    }

    fn scenario_items() -> Vec<Item> {
        vec![
            item("Margherita Pizza", "pizza", 12.5),
            item("Caesar Salad", "salad", 9.0),
        ]
    }

    fn membership_candidate(step: &RunStep) -> String {
        let query = step.current_query.as_ref().expect("a question is pending");
        assert_eq!(query.kind, QueryKind::Membership);
        serde_json::from_str::<MembershipPayload>(&query.payload)
            .expect("payload is well-formed")
            .candidate
    }

    #[test_log::test]
    fn scenario_pizza_salad_full_run() {
        let mut engine = Engine::with_items(
            LStarConfig::default(),
            OracleMode::Human,
            scenario_items(),
        );
        let step = engine.start_learning("demo", "pizza").unwrap();
        let session = step.session;
        assert!(!step.is_complete);
        assert_eq!(membership_candidate(&step), "Margherita Pizza");

        let step = engine.answer_query(session, "true").unwrap();
        assert_eq!(membership_candidate(&step), "Caesar Salad");

        let step = engine.answer_query(session, "false").unwrap();
        let query = step.current_query.as_ref().expect("equivalence is pending");
        assert_eq!(query.kind, QueryKind::Equivalence);

        let step = engine.answer_query(session, "correct").unwrap();
        assert!(step.is_complete);
        assert!(step.final_result.unwrap().contains("2/2"));

        let hypothesis = engine.current_hypothesis(session).unwrap();
        assert_eq!(hypothesis.accept_states, vec!["Margherita Pizza"]);
        assert_eq!(hypothesis.target_concept, "pizza");

        let metrics = engine.metrics(session).unwrap();
        assert_eq!(metrics.membership_queries, 2);
        assert_eq!(metrics.equivalence_queries, 1);
        assert_eq!(metrics.total_queries, 3);
        assert!(metrics.has_hypothesis);

        let session_row = engine.store().session(session).unwrap();
        assert_eq!(session_row.status, SessionStatus::Completed);
        assert!(session_row.description.contains("replay accuracy"));
    }

    #[test_log::test]
    fn corpus_mode_converges_without_any_queries() {
        let mut engine = Engine::new(LStarConfig::default(), OracleMode::Corpus);
        let step = engine.start_learning("auto", "pizza").unwrap();
        assert!(step.is_complete);
        assert!(step.final_result.unwrap().contains("9/9"));

        let metrics = engine.metrics(step.session).unwrap();
        assert_eq!(metrics.total_queries, 0);
        let hypothesis = engine.current_hypothesis(step.session).unwrap();
        assert!(hypothesis
            .accept_states
            .contains(&"Margherita Pizza".to_string()));
        assert!(!hypothesis.accept_states.contains(&"Tiramisu".to_string()));
    }

    #[test_log::test]
    fn exhausted_budgets_still_reach_a_terminal_hypothesis() {
        let config = LStarConfig {
            max_membership_queries: 2,
            max_equivalence_queries: 0,
            ..LStarConfig::default()
        };
        let items = vec![
            item("Margherita Pizza", "pizza", 12.5),
            item("Pepperoni Pizza", "pizza", 14.0),
            item("Caesar Salad", "salad", 9.0),
            item("Greek Salad", "salad", 8.5),
            item("Tiramisu", "dessert", 6.5),
        ];
        let mut engine = Engine::with_items(config, OracleMode::Human, items);

        // never answering anything must still terminate with a hypothesis
        let step = engine.start_learning("broke", "pizza").unwrap();
        assert!(step.is_complete);
        let metrics = engine.metrics(step.session).unwrap();
        assert!(metrics.membership_queries <= 2);
        assert!(metrics.has_hypothesis);
    }

    #[test_log::test]
    fn resume_is_idempotent_without_new_answers() {
        let mut engine = Engine::with_items(
            LStarConfig::default(),
            OracleMode::Human,
            scenario_items(),
        );
        let step = engine.start_learning("demo", "pizza").unwrap();
        let session = step.session;
        engine.answer_query(session, "true").unwrap();

        let first = engine.resume(session).unwrap();
        let metrics_first = engine.metrics(session).unwrap();
        let second = engine.resume(session).unwrap();
        let metrics_second = engine.metrics(session).unwrap();
        assert_eq!(first, second);
        assert_eq!(metrics_first, metrics_second);
    }

    #[test_log::test]
    fn re_answering_the_same_query_changes_nothing() {
        let mut engine = Engine::with_items(
            LStarConfig::default(),
            OracleMode::Human,
            scenario_items(),
        );
        let step = engine.start_learning("demo", "pizza").unwrap();
        let session = step.session;
        let query = step.current_query.unwrap().id;

        let after_first = engine.answer_query_by_id(session, query, "true").unwrap();
        let metrics_first = engine.metrics(session).unwrap();
        let after_second = engine.answer_query_by_id(session, query, "false").unwrap();
        let metrics_second = engine.metrics(session).unwrap();
        assert_eq!(after_first, after_second);
        assert_eq!(metrics_first.membership_queries, metrics_second.membership_queries);
    }

    #[test]
    fn unknown_sessions_are_a_hard_failure() {
        let mut engine = Engine::with_items(
            LStarConfig::default(),
            OracleMode::Human,
            scenario_items(),
        );
        assert_eq!(
            engine.answer_query(42, "true").unwrap_err(),
            LearningError::SessionNotFound(42)
        );
        assert_eq!(
            engine.metrics(42).unwrap_err(),
            LearningError::SessionNotFound(42)
        );
        assert_eq!(
            engine.current_hypothesis(42).unwrap_err(),
            LearningError::SessionNotFound(42)
        );
    }

    #[test_log::test]
    fn starting_with_a_known_name_resumes_the_session() {
        let mut engine = Engine::with_items(
            LStarConfig::default(),
            OracleMode::Human,
            scenario_items(),
        );
        let first = engine.start_learning("demo", "pizza").unwrap();
        let again = engine.start_learning("demo", "pizza").unwrap();
        assert_eq!(first.session, again.session);
        // no duplicate question was recorded
        assert_eq!(
            engine.metrics(first.session).unwrap().membership_queries,
            1
        );
    }
}
