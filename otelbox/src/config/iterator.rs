//! Iterator domains and the combination generator used by expansion.

use indexmap::IndexMap;
use regex::Regex;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::expand::ExpansionError;
use super::raw::RawIterator;

static ITERATOR_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("iterator name pattern is valid")
});

/// One assignment of a value to every requested iterator.
pub type Combination<'a> = IndexMap<&'a str, &'a str>;

/// Declared iterators, each an ordered set of string values.
#[derive(Debug, Clone, Default)]
pub struct IteratorRegistry {
    domains: IndexMap<String, Vec<String>>,
}

impl IteratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the registry from the document's `iterators` section.
    pub fn from_raw(raw: &IndexMap<String, RawIterator>) -> Result<Self, ExpansionError> {
        let mut registry = Self::new();
        for (name, iterator) in raw {
            registry.declare(name, iterator.values(name)?)?;
        }
        Ok(registry)
    }

    pub fn declare(&mut self, name: &str, values: Vec<String>) -> Result<(), ExpansionError> {
        if !ITERATOR_NAME.is_match(name) {
            return Err(ExpansionError::InvalidName {
                name: name.to_string(),
            });
        }
        if values.is_empty() {
            return Err(ExpansionError::EmptyIterator {
                name: name.to_string(),
            });
        }

        let mut seen = HashSet::new();
        for value in &values {
            if !seen.insert(value.as_str()) {
                return Err(ExpansionError::DuplicateValue {
                    name: name.to_string(),
                    value: value.clone(),
                });
            }
        }

        self.domains.insert(name.to_string(), values);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.domains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    /// Looks up the domains of `names`, in the order given.
    pub fn get_iterators<'a, I, S>(
        &'a self,
        names: I,
    ) -> Result<CombinationGenerator<'a>, ExpansionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut iterators = Vec::new();
        for name in names {
            let name = name.as_ref();
            let (key, values) = self.domains.get_key_value(name).ok_or_else(|| {
                ExpansionError::UnknownIterator {
                    name: name.to_string(),
                }
            })?;
            iterators.push((key.as_str(), values.as_slice()));
        }
        Ok(CombinationGenerator { iterators })
    }
}

/// Cartesian product over a fixed list of iterator domains.
///
/// Combinations are produced lexicographically: the first iterator is the
/// most significant, values follow their declared order.
#[derive(Debug, Clone)]
pub struct CombinationGenerator<'a> {
    iterators: Vec<(&'a str, &'a [String])>,
}

impl<'a> CombinationGenerator<'a> {
    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.iterators.iter().map(|(name, _)| *name)
    }

    /// Product of the domain sizes; an empty iterator list yields one (empty) combination.
    pub fn total(&self) -> usize {
        self.iterators
            .iter()
            .map(|(_, values)| values.len())
            .product()
    }

    pub fn iter(&self) -> Combinations<'a> {
        let exhausted = self.total() == 0;
        Combinations {
            iterators: self.iterators.clone(),
            cursor: vec![0; self.iterators.len()],
            exhausted,
        }
    }

    /// Visits every combination, stopping at the first error from `f`.
    pub fn for_each<E, F>(&self, mut f: F) -> Result<(), E>
    where
        F: FnMut(&Combination<'a>) -> Result<(), E>,
    {
        for combination in self.iter() {
            f(&combination)?;
        }
        Ok(())
    }
}

/// Odometer over the domains of a [`CombinationGenerator`].
#[derive(Debug, Clone)]
pub struct Combinations<'a> {
    iterators: Vec<(&'a str, &'a [String])>,
    cursor: Vec<usize>,
    exhausted: bool,
}

impl<'a> Iterator for Combinations<'a> {
    type Item = Combination<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let combination = self
            .iterators
            .iter()
            .zip(&self.cursor)
            .map(|((name, values), &index)| (*name, values[index].as_str()))
            .collect();

        // Advance the least significant position first.
        self.exhausted = true;
        for position in (0..self.cursor.len()).rev() {
            self.cursor[position] += 1;
            if self.cursor[position] < self.iterators[position].1.len() {
                self.exhausted = false;
                break;
            }
            self.cursor[position] = 0;
        }

        Some(combination)
    }
}
