use itertools::Itertools;
use tracing::{debug, trace, warn};

use tabula_core::{alphabet::Alphabet, dfa::LearnedDfa, math, word::Class, Show};

use super::{observationtable::ObservationTable, oracle::Oracle};

/// Derives the hypothesis automaton from the current table.
///
/// States are the distinct rows of the base, named by the access string of
/// the first base entry carrying the row; insertion order breaks ties, so the
/// result is reproducible. A state accepts if its row is `true` at the empty
/// experiment. Transitions follow row equality of the one-symbol extensions;
/// an extension whose row matches no base row (an unclosed table) simply gets
/// no transition, which rejects.
///
/// A table whose base was lost does not fail here: the base is repopulated
/// from whatever rows are cached before extraction proceeds.
pub fn build_hypothesis<A, O>(table: &mut ObservationTable<A>, oracle: &mut O) -> LearnedDfa
where
    A: Alphabet,
    O: Oracle<Alphabet = A>,
{
    let start = std::time::Instant::now();

    if table.states().is_empty() {
        warn!("hypothesis requested for a table without base, repopulating from cached rows");
        table.add_state(Class::epsilon());
        for word in table.cached_words() {
            table.add_state(word);
        }
    }

    let states = table.states().to_vec();
    let alphabet = table.alphabet().clone();

    // distinct rows, first occurrence in insertion order wins
    let mut representatives: math::Map<Vec<bool>, Class<A::Symbol>> = math::Map::default();
    for state in &states {
        let row = table.row(oracle, state);
        representatives.entry(row).or_insert_with(|| state.clone());
    }

    let epsilon_at = table.experiments().iter().position(|e| e.is_empty());

    let mut dfa_states = Vec::new();
    let mut accepting = math::Set::default();
    for (row, representative) in &representatives {
        let name = alphabet.encode(representative);
        if epsilon_at.map(|at| row[at]).unwrap_or(false) {
            accepting.insert(name.clone());
        }
        dfa_states.push(name);
    }

    let mut transitions: math::Map<String, math::Map<String, String>> = math::Map::default();
    let symbols = alphabet.universe().collect_vec();
    for representative in representatives.values().cloned().collect_vec() {
        if alphabet.is_atomic() && !representative.is_empty() {
            continue;
        }
        let name = alphabet.encode(&representative);
        for sym in &symbols {
            let extension = &representative + sym;
            let row = table.row(oracle, &extension);
            let Some(target) = representatives.get(&row) else {
                trace!(
                    "no representative for the row of {}, leaving the transition out",
                    extension.show()
                );
                continue;
            };
            transitions
                .entry(name.clone())
                .or_default()
                .insert(sym.show(), alphabet.encode(target));
        }
    }

    let initial = {
        let first = states.first().expect("base is never empty at this point");
        let row = table.row(oracle, first);
        alphabet.encode(
            representatives
                .get(&row)
                .expect("every base row has a representative"),
        )
    };

    debug!(
        "built a {}-state hypothesis in {}us",
        dfa_states.len(),
        start.elapsed().as_micros()
    );

    LearnedDfa {
        states: dfa_states,
        alphabet: symbols.iter().map(|sym| sym.show()).collect(),
        transitions,
        initial,
        accepting,
    }
}

#[cfg(test)]
mod tests {
    use tabula_core::prelude::*;

    use super::super::oracle::tests::predicate_oracle;
    use super::*;

    #[test]
    fn scenario_pizza_concept_accepts_only_the_pizza() {
        let alphabet =
            CatalogAlphabet::new(["Margherita Pizza".to_string(), "Caesar Salad".to_string()]);
        let mut oracle = predicate_oracle(alphabet.clone(), |w: &Class<String>| {
            w.first().map(|n| n == "Margherita Pizza").unwrap_or(false)
        });
        let mut table = ObservationTable::rehydrate(
            alphabet,
            std::iter::empty(),
            std::iter::empty(),
            std::iter::empty(),
        );
        table.rebuild(&mut oracle);

        let dfa = build_hypothesis(&mut table, &mut oracle);
        assert_eq!(
            dfa.accepting.iter().collect_vec(),
            vec!["Margherita Pizza"]
        );
        assert!(dfa.accepts(["Margherita Pizza"]));
        assert!(!dfa.accepts(["Caesar Salad"]));
        assert!(!dfa.accepts(["Anything Else"]));
    }

    #[test]
    fn lost_base_is_repopulated_instead_of_failing() {
        let alphabet = CharAlphabet::new(['a', 'b']);
        let mut oracle = predicate_oracle(alphabet.clone(), |w: &Class<char>| {
            w.first() == Some(&'a')
        });
        let mut table = ObservationTable::with_states(alphabet, std::iter::empty());
        table.record(Class::from("a"), true);
        table.record(Class::from("b"), false);
        assert!(table.states().is_empty());

        let dfa = build_hypothesis(&mut table, &mut oracle);
        assert!(dfa.size() > 0);
        assert_eq!(dfa.initial, "");
        assert!(dfa.accepts(["a"]));
    }
}
