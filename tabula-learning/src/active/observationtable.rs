use itertools::Itertools;
use owo_colors::OwoColorize;
use tabled::{builder::Builder, settings::Style};
use tracing::{debug, trace};

use tabula_core::{alphabet::Alphabet, math, word::Class, Show};

use super::oracle::Oracle;

/// An experiment is a suffix that distinguishes states; structurally it is
/// just a word.
pub type Experiment<S> = Class<S>;

/// The S×E boolean matrix driving the learner: a base of access strings
/// (states), a list of experiments, and a cache of membership results keyed
/// by the concatenated word.
///
/// The base and experiment lists preserve insertion order; hypothesis
/// extraction breaks row-equality ties by the first matching base entry, so
/// that order is semantically relevant, not cosmetic.
#[derive(Clone, PartialEq)]
pub struct ObservationTable<A: Alphabet> {
    alphabet: A,
    states: Vec<Class<A::Symbol>>,
    experiments: Vec<Experiment<A::Symbol>>,
    cells: math::Map<Class<A::Symbol>, bool>,
}

impl<A: Alphabet> ObservationTable<A> {
    /// Creates a table with the empty class in both the base and the
    /// experiment list.
    pub fn new(alphabet: A) -> Self {
        Self {
            alphabet,
            states: vec![Class::epsilon()],
            experiments: vec![Experiment::epsilon()],
            cells: math::Map::default(),
        }
    }

    /// Creates a table with the given base and only the empty experiment.
    /// Unlike [`ObservationTable::new`], the empty class is not added
    /// implicitly; this is the entry point for rebuilding a lost base.
    pub fn with_states<I>(alphabet: A, states: I) -> Self
    where
        I: IntoIterator<Item = Class<A::Symbol>>,
    {
        Self {
            alphabet,
            states: states.into_iter().unique().collect(),
            experiments: vec![Experiment::epsilon()],
            cells: math::Map::default(),
        }
    }

    /// Reconstructs a table wholesale from persisted query history: every
    /// query candidate becomes a base entry, counterexamples additionally
    /// become experiments, answered queries pre-populate the cell cache.
    ///
    /// The result is a pure function of its inputs, which is what makes
    /// resuming a suspended session idempotent.
    pub fn rehydrate<C, R, X>(alphabet: A, candidates: C, answers: R, counterexamples: X) -> Self
    where
        C: IntoIterator<Item = Class<A::Symbol>>,
        R: IntoIterator<Item = (Class<A::Symbol>, bool)>,
        X: IntoIterator<Item = Class<A::Symbol>>,
    {
        let mut table = Self::new(alphabet);
        if table.alphabet.is_atomic() {
            // every catalog item is its own state
            let symbols = table.alphabet.universe().collect_vec();
            for sym in symbols {
                table.add_state(Class::singleton(sym));
            }
        }
        for candidate in candidates {
            table.add_state(candidate);
        }
        for cex in counterexamples {
            table.add_state(cex.clone());
            table.add_experiment(cex);
        }
        for (word, result) in answers {
            table.record(word, result);
        }
        table
    }

    pub fn alphabet(&self) -> &A {
        &self.alphabet
    }

    pub fn states(&self) -> &[Class<A::Symbol>] {
        &self.states
    }

    pub fn experiments(&self) -> &[Experiment<A::Symbol>] {
        &self.experiments
    }

    /// Adds a class to the base. Returns whether the table changed.
    pub fn add_state(&mut self, class: Class<A::Symbol>) -> bool {
        if self.states.contains(&class) {
            return false;
        }
        trace!("promoting {} into the base", class.show());
        self.states.push(class);
        true
    }

    /// Adds an experiment. Returns whether the table changed.
    pub fn add_experiment(&mut self, experiment: Experiment<A::Symbol>) -> bool {
        if self.experiments.contains(&experiment) {
            return false;
        }
        trace!("adding experiment {}", experiment.show());
        self.experiments.push(experiment);
        true
    }

    /// Pre-seeds the cell cache with a known membership result.
    pub fn record(&mut self, word: Class<A::Symbol>, result: bool) {
        self.cells.insert(word, result);
    }

    /// Returns the cached result for a concatenated word, if any.
    pub fn lookup(&self, word: &Class<A::Symbol>) -> Option<bool> {
        self.cells.get(word).copied()
    }

    /// All words with a cached result, in insertion order.
    pub(crate) fn cached_words(&self) -> Vec<Class<A::Symbol>> {
        self.cells.keys().cloned().collect()
    }

    /// The single cell lookup: cached results are returned as-is, everything
    /// else is delegated to the oracle and cached. A query the oracle cannot
    /// answer yet comes back as a provisional `false`, so the caller can make
    /// forward progress; the cell is recomputed on the next rebuild.
    pub fn query<O: Oracle<Alphabet = A>>(
        &mut self,
        oracle: &mut O,
        state: &Class<A::Symbol>,
        experiment: &Experiment<A::Symbol>,
    ) -> bool {
        let word = state + experiment;
        if let Some(cached) = self.cells.get(&word) {
            return *cached;
        }
        let result = oracle.membership(&word);
        self.cells.insert(word, result);
        result
    }

    /// The full row of a class across all current experiments.
    pub fn row<O: Oracle<Alphabet = A>>(
        &mut self,
        oracle: &mut O,
        class: &Class<A::Symbol>,
    ) -> Vec<bool> {
        (0..self.experiments.len())
            .map(|i| {
                let experiment = self.experiments[i].clone();
                self.query(oracle, class, &experiment)
            })
            .collect()
    }

    /// One-symbol extensions of the given class. Atomic alphabets only
    /// extend the empty class; longer concatenations of catalog items do not
    /// denote anything.
    fn extensions_of(&self, class: &Class<A::Symbol>) -> Vec<Class<A::Symbol>> {
        if self.alphabet.is_atomic() && !class.is_empty() {
            return vec![];
        }
        self.alphabet.universe().map(|a| class + &a).collect()
    }

    /// Drops all cached cells and recomputes the complete S×E matrix,
    /// including the rows of all one-symbol extensions. Queries the oracle
    /// has durable answers for are free; the rest surface as new pending
    /// queries (subject to the oracle's budget).
    pub fn rebuild<O: Oracle<Alphabet = A>>(&mut self, oracle: &mut O) {
        self.cells.clear();
        let states = self.states.clone();
        for state in &states {
            self.row(oracle, state);
            for extension in self.extensions_of(state) {
                self.row(oracle, &extension);
            }
        }
        trace!("table after rebuild\n{}", self);
    }

    /// Finds a one-symbol extension whose row matches no base row, if any.
    fn unmatched_extension<O: Oracle<Alphabet = A>>(
        &mut self,
        oracle: &mut O,
    ) -> Option<Class<A::Symbol>> {
        let states = self.states.clone();
        let base_rows = states
            .iter()
            .map(|s| self.row(oracle, s))
            .collect::<Vec<_>>();
        for state in &states {
            for extension in self.extensions_of(state) {
                if states.contains(&extension) {
                    continue;
                }
                let row = self.row(oracle, &extension);
                if !base_rows.contains(&row) {
                    return Some(extension);
                }
            }
        }
        None
    }

    /// Whether every one-symbol extension's row matches some base row.
    pub fn is_closed<O: Oracle<Alphabet = A>>(&mut self, oracle: &mut O) -> bool {
        self.unmatched_extension(oracle).is_none()
    }

    /// Promotes unmatched extensions into the base until a full pass adds
    /// nothing. Returns whether the base grew.
    pub fn make_closed<O: Oracle<Alphabet = A>>(&mut self, oracle: &mut O) -> bool {
        let mut changed = false;
        while let Some(extension) = self.unmatched_extension(oracle) {
            debug!("table not closed, missing row for {}", extension.show());
            self.add_state(extension);
            changed = true;
        }
        changed
    }

    /// Finds an experiment witnessing that two base classes with equal rows
    /// diverge after a one-symbol extension, if any.
    fn inconsistency<O: Oracle<Alphabet = A>>(
        &mut self,
        oracle: &mut O,
    ) -> Option<Experiment<A::Symbol>> {
        if self.alphabet.is_atomic() {
            return None;
        }
        let states = self.states.clone();
        let symbols = self.alphabet.universe().collect_vec();
        let experiments = self.experiments.clone();
        for (i, left) in states.iter().enumerate() {
            for right in &states[i + 1..] {
                if self.row(oracle, left) != self.row(oracle, right) {
                    continue;
                }
                for sym in &symbols {
                    let left_row = self.row(oracle, &(left + sym));
                    let right_row = self.row(oracle, &(right + sym));
                    if left_row == right_row {
                        continue;
                    }
                    for (j, experiment) in experiments.iter().enumerate() {
                        if left_row[j] != right_row[j] {
                            return Some(&Class::singleton(sym.clone()) + experiment);
                        }
                    }
                }
            }
        }
        None
    }

    /// Whether no pair of equal-row base classes diverges after extension.
    pub fn is_consistent<O: Oracle<Alphabet = A>>(&mut self, oracle: &mut O) -> bool {
        self.inconsistency(oracle).is_none()
    }

    /// Adds distinguishing experiments until a full pass finds no
    /// divergence. Returns whether the experiment list grew.
    pub fn make_consistent<O: Oracle<Alphabet = A>>(&mut self, oracle: &mut O) -> bool {
        let mut changed = false;
        while let Some(experiment) = self.inconsistency(oracle) {
            debug!(
                "table not consistent, distinguishing experiment {}",
                experiment.show()
            );
            self.add_experiment(experiment);
            changed = true;
        }
        changed
    }
}

impl<A: Alphabet> std::fmt::Display for ObservationTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut builder = Builder::default();
        builder.push_record(
            std::iter::once("".to_string()).chain(self.experiments.iter().map(|e| e.show())),
        );

        let extensions = self
            .states
            .iter()
            .flat_map(|s| self.extensions_of(s))
            .filter(|ext| !self.states.contains(ext))
            .unique()
            .collect_vec();
        for class in self.states.iter().chain(extensions.iter()) {
            let name = if self.states.contains(class) {
                class.show().bold().to_string()
            } else {
                class.show()
            };
            let cells = self.experiments.iter().map(|e| {
                self.lookup(&(class + e))
                    .map(|b| b.show())
                    .unwrap_or_else(|| "?".to_string())
            });
            builder.push_record(std::iter::once(name).chain(cells));
        }

        let mut table = builder.build();
        table.with(Style::modern());
        write!(f, "{}", table)
    }
}

impl<A: Alphabet> std::fmt::Debug for ObservationTable<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}
