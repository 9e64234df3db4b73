//! Finite words over an alphabet of [`Symbol`]s.

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{alphabet::Symbol, Show};

/// A finite (possibly empty) sequence of symbols. This doubles as the access
/// string of an observation-table state and as an experiment suffix; the
/// empty class is the identity element for concatenation-based extension.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Class<S>(pub Vec<S>);

impl<S> Class<S> {
    /// Creates an instance of the empty class.
    pub fn epsilon() -> Self {
        Self(vec![])
    }

    /// Takes in a single symbol and returns a class containing only that symbol.
    pub fn singleton(sym: S) -> Self {
        Self(vec![sym])
    }

    /// Number of symbols in this class.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this is the empty class.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Show> Show for Class<S> {
    fn show(&self) -> String {
        if self.is_empty() {
            "ε".to_string()
        } else {
            self.0.iter().map(|sym| sym.show()).join("")
        }
    }
}

impl<S: Symbol> std::fmt::Display for Class<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.show())
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for Class<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}]", self.0)
    }
}

impl<S> std::ops::Deref for Class<S> {
    type Target = Vec<S>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<S> std::ops::DerefMut for Class<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<S> Default for Class<S> {
    fn default() -> Self {
        Self(vec![])
    }
}

impl<S> From<Vec<S>> for Class<S> {
    fn from(value: Vec<S>) -> Self {
        Self(value)
    }
}

impl From<&str> for Class<char> {
    fn from(value: &str) -> Self {
        Self(value.chars().collect())
    }
}

impl<S> FromIterator<S> for Class<S> {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Extension of a class by a single symbol, `&class + &sym`.
impl<S: Symbol> std::ops::Add<&S> for &Class<S> {
    type Output = Class<S>;

    fn add(self, rhs: &S) -> Self::Output {
        let mut out = self.0.clone();
        out.push(rhs.clone());
        Class(out)
    }
}

/// Concatenation of two classes, `&state + &experiment`.
impl<S: Symbol> std::ops::Add<&Class<S>> for &Class<S> {
    type Output = Class<S>;

    fn add(self, rhs: &Class<S>) -> Self::Output {
        self.0.iter().chain(rhs.0.iter()).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_concatenation() {
        let left: Class<char> = "ab".into();
        let right = Class::singleton('c');
        assert_eq!(&left + &right, "abc".into());
        assert_eq!(&left + &'c', "abc".into());
        assert_eq!(&Class::<char>::epsilon() + &left, left);
    }

    #[test]
    fn epsilon_shows_as_epsilon() {
        assert_eq!(Class::<char>::epsilon().show(), "ε");
        assert_eq!(Class::<char>::from("ab").show(), "ab");
    }
}
