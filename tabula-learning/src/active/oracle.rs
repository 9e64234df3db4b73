use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use tabula_core::{alphabet::Alphabet, dfa::LearnedDfa, math, word::Class, SessionId, Show};

use crate::store::{Item, QueryKind, QueryStatus, Store};

/// Convenience alias for the symbol type an oracle speaks.
pub type SymbolOf<O> = <<O as Oracle>::Alphabet as Alphabet>::Symbol;

/// Outcome of an equivalence query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Equivalence<S> {
    /// The oracle considers the hypothesis equal to the target concept.
    Correct,
    /// A word on which the hypothesis and the target concept disagree.
    Counterexample(Class<S>),
    /// The question is recorded but unanswered; the learner must suspend and
    /// wait for an external answer before it can continue.
    Pending,
}

/// The answering side of the learning loop. This is mainly used by L*-esque
/// algorithms and can be backed by wildly different things: a lookup into the
/// reference corpus, a queue of questions for a human, or a combination of
/// the two.
pub trait Oracle {
    type Alphabet: Alphabet;

    fn alphabet(&self) -> &Self::Alphabet;

    /// Answers "is this word in the target concept?". Implementations that
    /// cannot answer immediately record the question durably and answer a
    /// provisional `false`; the learner re-asks on its next rebuild.
    fn membership(&mut self, word: &Class<SymbolOf<Self>>) -> bool;

    /// Asks whether the hypothesis matches the target concept.
    fn equivalence(&mut self, hypothesis: &LearnedDfa) -> Equivalence<SymbolOf<Self>>;
}

/// The tolerant boolean grammar for membership answers: case-insensitive
/// `true`, `yes` and `1` accept; anything else, including garbage, rejects.
pub fn parse_bool_response(response: &str) -> bool {
    matches!(
        response.trim().to_lowercase().as_str(),
        "true" | "yes" | "1"
    )
}

/// What a membership question carries so that a human can answer it without
/// any other context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembershipPayload {
    /// The encoded word being asked about.
    pub candidate: String,
    pub question: String,
    /// A few corpus entries with their categories, for orientation.
    pub examples: Vec<String>,
    /// Progress counter: this is question `asked` of at most `budget`.
    pub asked: usize,
    pub budget: usize,
}

/// What an equivalence question carries: the serialized hypothesis and what
/// to do with it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquivalencePayload {
    pub hypothesis: LearnedDfa,
    pub instructions: String,
}

/// An oracle answering from the seeded reference corpus: a word is a member
/// exactly if it names an item of the target category. Equivalence is decided
/// by replaying the hypothesis against the full catalog; the first
/// disagreement is the counterexample. All answers are free, no queries are
/// ever persisted.
#[derive(Debug, Clone)]
pub struct CorpusOracle<A: Alphabet> {
    alphabet: A,
    catalog: Vec<Class<A::Symbol>>,
    positives: math::Set<String>,
    concept: String,
}

impl<A: Alphabet> CorpusOracle<A> {
    pub fn from_items(alphabet: A, items: &[Item], concept: &str) -> Self {
        let mut catalog = Vec::new();
        let mut positives = math::Set::default();
        for item in items {
            let Some(word) = alphabet.decode(&item.name) else {
                warn!("item `{}` is not a word over the alphabet, skipping", item.name);
                continue;
            };
            if item.category == concept {
                positives.insert(alphabet.encode(&word));
            }
            catalog.push(word);
        }
        Self {
            alphabet,
            catalog,
            positives,
            concept: concept.to_string(),
        }
    }

    /// Whether the word denotes a catalog entry this oracle can answer for.
    pub fn knows(&self, word: &Class<A::Symbol>) -> bool {
        self.catalog.contains(word)
    }

    pub fn concept(&self) -> &str {
        &self.concept
    }
}

impl<A: Alphabet> Oracle for CorpusOracle<A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        &self.alphabet
    }

    fn membership(&mut self, word: &Class<A::Symbol>) -> bool {
        self.positives.contains(&self.alphabet.encode(word))
    }

    fn equivalence(&mut self, hypothesis: &LearnedDfa) -> Equivalence<A::Symbol> {
        for word in std::iter::once(Class::epsilon()).chain(self.catalog.iter().cloned()) {
            let expected = self.positives.contains(&self.alphabet.encode(&word));
            let got = hypothesis.accepts(word.iter().map(|sym| sym.show()));
            if expected != got {
                trace!("hypothesis disagrees with corpus on {}", word.show());
                return Equivalence::Counterexample(word);
            }
        }
        Equivalence::Correct
    }
}

/// The gateway to an external (usually human) oracle. Answers are looked up
/// in the session's durably answered queries first; a miss creates a pending
/// query for the outside world and answers a provisional `false`.
///
/// Budgets are enforced here: once `max_membership` queries exist for the
/// session, misses are answered `false` unconditionally, and once
/// `max_equivalence` queries exist, equivalence short-circuits to
/// [`Equivalence::Correct`]. At most one question per kind is outstanding at
/// any time, so a user answering the oldest pending query drives the
/// algorithm forward deterministically.
#[derive(Debug)]
pub struct SessionOracle<'s, A: Alphabet> {
    alphabet: A,
    store: &'s mut Store,
    session: SessionId,
    concept: String,
    max_membership: usize,
    max_equivalence: usize,
}

impl<'s, A: Alphabet> SessionOracle<'s, A> {
    pub fn new(
        alphabet: A,
        store: &'s mut Store,
        session: SessionId,
        concept: &str,
        max_membership: usize,
        max_equivalence: usize,
    ) -> Self {
        Self {
            alphabet,
            store,
            session,
            concept: concept.to_string(),
            max_membership,
            max_equivalence,
        }
    }

    fn answered_membership(&self, candidate: &str) -> Option<bool> {
        for query in self.store.queries_of(self.session) {
            if query.kind != QueryKind::Membership || query.status != QueryStatus::Answered {
                continue;
            }
            match serde_json::from_str::<MembershipPayload>(&query.payload) {
                Ok(payload) if payload.candidate == candidate => {
                    return query.response.as_deref().map(parse_bool_response);
                }
                Ok(_) => {}
                Err(err) => {
                    // malformed rows count as unanswered, never as a failure
                    warn!("ignoring query {} with malformed payload: {err}", query.id);
                }
            }
        }
        None
    }
}

impl<A: Alphabet> Oracle for SessionOracle<'_, A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        &self.alphabet
    }

    fn membership(&mut self, word: &Class<A::Symbol>) -> bool {
        let candidate = self.alphabet.encode(word);
        if let Some(answer) = self.answered_membership(&candidate) {
            return answer;
        }
        // the empty word never names a catalog entity, don't spend a question on it
        if self.alphabet.is_atomic() && word.is_empty() {
            return false;
        }
        if self.store.has_pending(self.session, QueryKind::Membership) {
            trace!("a membership question is already outstanding, provisional non-member");
            return false;
        }
        let asked = self.store.query_count(self.session, QueryKind::Membership);
        if asked >= self.max_membership {
            debug!(
                "membership budget of {} exhausted, answering non-member",
                self.max_membership
            );
            return false;
        }
        let payload = MembershipPayload {
            question: format!(
                "Does \"{}\" belong to the concept \"{}\"?",
                candidate, self.concept
            ),
            examples: self
                .store
                .items()
                .iter()
                .take(3)
                .map(|item| format!("{} ({})", item.name, item.category))
                .collect(),
            asked: asked + 1,
            budget: self.max_membership,
            candidate,
        };
        let id = self.store.create_query(
            self.session,
            QueryKind::Membership,
            serde_json::to_string(&payload).expect("membership payload always serializes"),
        );
        debug!("recorded membership query {id} for {}", word.show());
        false
    }

    fn equivalence(&mut self, hypothesis: &LearnedDfa) -> Equivalence<A::Symbol> {
        let asked = self.store.query_count(self.session, QueryKind::Equivalence);
        if asked >= self.max_equivalence {
            debug!(
                "equivalence budget of {} exhausted, assuming the hypothesis is correct",
                self.max_equivalence
            );
            return Equivalence::Correct;
        }
        match self.store.latest_of_kind(self.session, QueryKind::Equivalence) {
            Some(query) if query.status == QueryStatus::Pending => return Equivalence::Pending,
            // only the literal answer `correct` flips an equivalence query to
            // answered, so this session has been declared converged
            Some(query) if query.status == QueryStatus::Answered => return Equivalence::Correct,
            _ => {}
        }
        // while membership answers are outstanding the hypothesis is built on
        // provisional cells; hold the equivalence question back
        if self.store.has_pending(self.session, QueryKind::Membership) {
            return Equivalence::Pending;
        }
        let payload = EquivalencePayload {
            hypothesis: hypothesis.clone(),
            instructions: format!(
                "Reply `correct` if this automaton matches the concept \"{}\", \
                 otherwise reply with a word it misclassifies.",
                self.concept
            ),
        };
        let id = self.store.create_query(
            self.session,
            QueryKind::Equivalence,
            serde_json::to_string(&payload).expect("equivalence payload always serializes"),
        );
        debug!("recorded equivalence query {id}");
        Equivalence::Pending
    }
}

/// Corpus lookup for words that denote catalog entries, the session gateway
/// for everything else. Equivalence always goes to the gateway.
#[derive(Debug)]
pub struct HybridOracle<'s, A: Alphabet> {
    corpus: CorpusOracle<A>,
    gateway: SessionOracle<'s, A>,
}

impl<'s, A: Alphabet> HybridOracle<'s, A> {
    pub fn new(corpus: CorpusOracle<A>, gateway: SessionOracle<'s, A>) -> Self {
        Self { corpus, gateway }
    }
}

impl<A: Alphabet> Oracle for HybridOracle<'_, A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        self.corpus.alphabet()
    }

    fn membership(&mut self, word: &Class<A::Symbol>) -> bool {
        if self.corpus.knows(word) {
            self.corpus.membership(word)
        } else {
            self.gateway.membership(word)
        }
    }

    fn equivalence(&mut self, hypothesis: &LearnedDfa) -> Equivalence<A::Symbol> {
        self.gateway.equivalence(hypothesis)
    }
}

/// The membership-answering capability the engine injects into a learning
/// run, chosen per session rather than branched on inside the learner.
#[derive(Debug)]
pub enum EngineOracle<'s, A: Alphabet> {
    Corpus(CorpusOracle<A>),
    Human(SessionOracle<'s, A>),
    Hybrid(HybridOracle<'s, A>),
}

impl<A: Alphabet> Oracle for EngineOracle<'_, A> {
    type Alphabet = A;

    fn alphabet(&self) -> &A {
        match self {
            EngineOracle::Corpus(oracle) => oracle.alphabet(),
            EngineOracle::Human(oracle) => oracle.alphabet(),
            EngineOracle::Hybrid(oracle) => oracle.alphabet(),
        }
    }

    fn membership(&mut self, word: &Class<A::Symbol>) -> bool {
        match self {
            EngineOracle::Corpus(oracle) => oracle.membership(word),
            EngineOracle::Human(oracle) => oracle.membership(word),
            EngineOracle::Hybrid(oracle) => oracle.membership(word),
        }
    }

    fn equivalence(&mut self, hypothesis: &LearnedDfa) -> Equivalence<A::Symbol> {
        match self {
            EngineOracle::Corpus(oracle) => oracle.equivalence(hypothesis),
            EngineOracle::Human(oracle) => oracle.equivalence(hypothesis),
            EngineOracle::Hybrid(oracle) => oracle.equivalence(hypothesis),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use tabula_core::prelude::*;

    use super::*;

    pub(crate) struct PredicateOracle<A: Alphabet, F> {
        alphabet: A,
        predicate: F,
    }

    /// An oracle for tests that answers membership from a closure and always
    /// considers the hypothesis correct.
    pub(crate) fn predicate_oracle<A, F>(alphabet: A, predicate: F) -> PredicateOracle<A, F>
    where
        A: Alphabet,
        F: FnMut(&Class<A::Symbol>) -> bool,
    {
        PredicateOracle {
            alphabet,
            predicate,
        }
    }

    impl<A, F> Oracle for PredicateOracle<A, F>
    where
        A: Alphabet,
        F: FnMut(&Class<A::Symbol>) -> bool,
    {
        type Alphabet = A;

        fn alphabet(&self) -> &A {
            &self.alphabet
        }

        fn membership(&mut self, word: &Class<A::Symbol>) -> bool {
            (self.predicate)(word)
        }

        fn equivalence(&mut self, _hypothesis: &LearnedDfa) -> Equivalence<A::Symbol> {
            Equivalence::Correct
        }
    }

    #[test]
    fn boolean_responses_parse_tolerantly() {
        for accept in ["true", "TRUE", " True ", "yes", "Yes", "1"] {
            assert!(parse_bool_response(accept), "{accept:?} should accept");
        }
        for reject in ["false", "no", "0", "", "correct", "totally"] {
            assert!(!parse_bool_response(reject), "{reject:?} should reject");
        }
    }

    fn catalog_and_store() -> (CatalogAlphabet, Store) {
        let mut store = Store::new();
        store.seed_items(vec![
            Item {
                name: "Margherita Pizza".to_string(),
                category: "pizza".to_string(),
                price: 12.5,
            },
            Item {
                name: "Caesar Salad".to_string(),
                category: "salad".to_string(),
                price: 9.0,
            },
        ]);
        let alphabet = CatalogAlphabet::new(store.items().iter().map(|i| i.name.clone()));
        (alphabet, store)
    }

    #[test_log::test]
    fn gateway_keeps_one_membership_question_outstanding() {
        let (alphabet, mut store) = catalog_and_store();
        let session = store.create_session("demo", "pizza");
        let mut oracle = SessionOracle::new(alphabet, &mut store, session, "pizza", 8, 3);

        let pizza = Class::singleton("Margherita Pizza".to_string());
        let salad = Class::singleton("Caesar Salad".to_string());
        assert!(!oracle.membership(&pizza));
        assert!(!oracle.membership(&salad));
        // only the first miss produced a question
        assert_eq!(store.query_count(session, QueryKind::Membership), 1);
    }

    #[test_log::test]
    fn gateway_honors_membership_budget() {
        let (alphabet, mut store) = catalog_and_store();
        let session = store.create_session("broke", "pizza");
        let mut oracle = SessionOracle::new(alphabet, &mut store, session, "pizza", 0, 3);

        let pizza = Class::singleton("Margherita Pizza".to_string());
        assert!(!oracle.membership(&pizza));
        assert_eq!(store.query_count(session, QueryKind::Membership), 0);
    }

    #[test_log::test]
    fn gateway_reads_answered_queries_back() {
        let (alphabet, mut store) = catalog_and_store();
        let session = store.create_session("demo", "pizza");
        let pizza = Class::singleton("Margherita Pizza".to_string());

        {
            let mut oracle = SessionOracle::new(alphabet.clone(), &mut store, session, "pizza", 8, 3);
            assert!(!oracle.membership(&pizza));
        }
        let pending = store.oldest_pending(session).expect("question exists").id;
        store.answer_query(pending, "Yes").unwrap();

        let mut oracle = SessionOracle::new(alphabet, &mut store, session, "pizza", 8, 3);
        assert!(oracle.membership(&pizza));
    }

    #[test]
    fn exhausted_equivalence_budget_assumes_convergence() {
        let (alphabet, mut store) = catalog_and_store();
        let session = store.create_session("demo", "pizza");
        let hypothesis = LearnedDfa {
            states: vec!["".to_string()],
            alphabet: math::Set::default(),
            transitions: math::Map::default(),
            initial: "".to_string(),
            accepting: math::Set::default(),
        };
        let mut oracle = SessionOracle::new(alphabet, &mut store, session, "pizza", 8, 0);
        assert_eq!(oracle.equivalence(&hypothesis), Equivalence::Correct);
        assert_eq!(store.query_count(session, QueryKind::Equivalence), 0);
    }
}
