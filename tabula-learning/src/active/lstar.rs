use rand::{seq::SliceRandom, Rng};
use tracing::{debug, info, trace};

use tabula_core::{alphabet::Alphabet, dfa::LearnedDfa, show_duration, word::Class, Show};

use super::{
    build_hypothesis,
    observationtable::ObservationTable,
    oracle::{Equivalence, Oracle, SymbolOf},
};

/// Backstop against a runaway loop; the query budgets terminate every run
/// long before this is reached.
const ITERATION_THRESHOLD: usize = if cfg!(debug_assertions) { 300 } else { 200_000 };

/// Which observation-table mode a session runs in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableMode {
    /// Every catalog item name is one atomic symbol.
    Atomic,
    /// Words are character strings over the corpus characters.
    Chars,
}

/// Tunables of a learning run. The budgets are the sole termination
/// mechanism for oracle interaction; there are no timeouts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LStarConfig {
    /// How many membership questions may be recorded per session.
    pub max_membership_queries: usize,
    /// How many equivalence questions may be recorded per session.
    pub max_equivalence_queries: usize,
    pub mode: TableMode,
    /// Upper bound on the randomly sampled corpus words seeding a fresh
    /// character-mode base.
    pub initial_sample: usize,
}

impl Default for LStarConfig {
    fn default() -> Self {
        Self {
            max_membership_queries: 8,
            max_equivalence_queries: 3,
            mode: TableMode::Atomic,
            initial_sample: 4,
        }
    }
}

/// Where in the learning lifecycle a session currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    BuildingTable,
    CheckingClosureConsistency,
    AwaitingEquivalence,
    Refining,
    Converged,
}

/// How a call to [`LStar::run`] ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The oracle accepted the hypothesis, or the budgets forced acceptance.
    Converged(LearnedDfa),
    /// A question is waiting for an external answer; the carried hypothesis
    /// is the current belief.
    AwaitingOracle(LearnedDfa),
}

enum Iteration<S> {
    Done(LearnedDfa),
    Suspend(LearnedDfa),
    Refined(Class<S>),
}

/// An implementation of the L* algorithm over an injected oracle.
///
/// One instance belongs to exactly one session and is never shared; resuming
/// a suspended session builds a fresh instance from persisted query history
/// instead of mutating this one.
pub struct LStar<A: Alphabet, O: Oracle<Alphabet = A>> {
    oracle: O,
    table: ObservationTable<A>,
    phase: Phase,
    iterations: usize,
}

impl<A: Alphabet, O: Oracle<Alphabet = A>> LStar<A, O> {
    pub fn new(table: ObservationTable<A>, oracle: O) -> Self {
        Self {
            oracle,
            table,
            phase: Phase::Initializing,
            iterations: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn table(&self) -> &ObservationTable<A> {
        &self.table
    }

    /// One full iteration: rebuild, reach the closure/consistency fixpoint,
    /// extract a hypothesis, ask the oracle.
    fn iteration(&mut self) -> Iteration<SymbolOf<O>> {
        self.phase = Phase::BuildingTable;
        self.table.rebuild(&mut self.oracle);

        self.phase = Phase::CheckingClosureConsistency;
        loop {
            let grew = self.table.make_closed(&mut self.oracle);
            let refined = self.table.make_consistent(&mut self.oracle);
            if refined {
                self.table.rebuild(&mut self.oracle);
            }
            if !grew && !refined {
                break;
            }
        }

        let hypothesis = build_hypothesis(&mut self.table, &mut self.oracle);
        trace!("iteration {} hypothesis\n{}", self.iterations, hypothesis);

        self.phase = Phase::AwaitingEquivalence;
        match self.oracle.equivalence(&hypothesis) {
            Equivalence::Correct => {
                self.phase = Phase::Converged;
                Iteration::Done(hypothesis)
            }
            Equivalence::Pending => Iteration::Suspend(hypothesis),
            Equivalence::Counterexample(counterexample) => {
                self.phase = Phase::Refining;
                Iteration::Refined(counterexample)
            }
        }
    }

    /// Drives iterations until the oracle is satisfied or a question has to
    /// wait for an external answer. Control returns to the caller in both
    /// cases; there is no in-process blocking.
    pub fn run(&mut self) -> RunOutcome {
        let start = std::time::Instant::now();
        while self.iterations < ITERATION_THRESHOLD {
            self.iterations += 1;
            match self.iteration() {
                Iteration::Done(hypothesis) => {
                    info!(
                        "learning converged on {} states after {} iterations in {}",
                        hypothesis.size(),
                        self.iterations,
                        show_duration(start.elapsed())
                    );
                    return RunOutcome::Converged(hypothesis);
                }
                Iteration::Suspend(hypothesis) => {
                    debug!(
                        "suspending after {} iterations, awaiting an oracle answer",
                        self.iterations
                    );
                    return RunOutcome::AwaitingOracle(hypothesis);
                }
                Iteration::Refined(counterexample) => {
                    debug!("absorbing counterexample {}", counterexample.show());
                    self.table.add_state(counterexample.clone());
                    self.table.add_experiment(counterexample);
                }
            }
        }
        panic!("iteration threshold exceeded!")
    }
}

/// Accuracy of a hypothesis replayed against labeled words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub correct: usize,
    pub total: usize,
}

impl Evaluation {
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }
}

impl std::fmt::Display for Evaluation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} ({:.0}%)",
            self.correct,
            self.total,
            self.accuracy() * 100.0
        )
    }
}

/// Replays the hypothesis against every labeled word and counts agreements.
pub fn evaluate<S: tabula_core::alphabet::Symbol>(
    hypothesis: &LearnedDfa,
    labeled: &[(Class<S>, bool)],
) -> Evaluation {
    let correct = labeled
        .iter()
        .filter(|(word, expected)| {
            hypothesis.accepts(word.iter().map(|sym| sym.show())) == *expected
        })
        .count();
    Evaluation {
        correct,
        total: labeled.len(),
    }
}

/// Bounded random sample of corpus words used to seed the base of a fresh
/// character-mode table.
pub fn seed_sample<S: tabula_core::alphabet::Symbol>(
    words: &[Class<S>],
    bound: usize,
    rng: &mut impl Rng,
) -> Vec<Class<S>> {
    words
        .choose_multiple(rng, bound.min(words.len()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use tabula_core::prelude::*;

    use super::super::oracle::tests::predicate_oracle;
    use super::*;

    #[test_log::test]
    fn converging_run_reports_its_phase() {
        let alphabet = CharAlphabet::new(['a']);
        let oracle = predicate_oracle(alphabet.clone(), |w: &Class<char>| w.len() % 2 == 0);
        let mut learner = LStar::new(ObservationTable::new(alphabet), oracle);
        assert_eq!(learner.phase(), Phase::Initializing);

        let RunOutcome::Converged(dfa) = learner.run() else {
            panic!("predicate oracles never suspend");
        };
        assert_eq!(learner.phase(), Phase::Converged);
        assert!(dfa.accepts(Vec::<&str>::new()));
    }

    #[test]
    fn evaluation_counts_agreements() {
        let alphabet = CatalogAlphabet::new(["Tiramisu".to_string()]);
        let mut oracle =
            predicate_oracle(alphabet.clone(), |w: &Class<String>| !w.is_empty());
        let mut table = ObservationTable::rehydrate(
            alphabet,
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );
        table.rebuild(&mut oracle);
        let dfa = build_hypothesis(&mut table, &mut oracle);

        let labeled = vec![
            (Class::singleton("Tiramisu".to_string()), true),
            (Class::epsilon(), false),
        ];
        let evaluation = evaluate(&dfa, &labeled);
        assert_eq!(evaluation.correct, 2);
        assert!(math::almost_equal(evaluation.accuracy(), 1.0, 0.001));
    }

    #[test]
    fn seed_sample_is_bounded() {
        let words: Vec<Class<char>> = vec!["a".into(), "b".into(), "ab".into()];
        let sample = seed_sample(&words, 2, &mut rand::thread_rng());
        assert_eq!(sample.len(), 2);
        assert!(sample.iter().all(|w| words.contains(w)));
    }
}
