//! Unordered collection with pluggable element equality.
//!
//! A [`Set`] runs in one of three modes:
//!
//! 1. [`Set::new`]: elements are their own keys (`Hash + Eq`), O(1) lookups.
//! 2. [`Set::keyed`]: equality compares a key extracted from each element,
//!    still O(1) through a map keyed on the extracted value.
//! 3. [`Set::with_eq`]: an arbitrary equality predicate, answered by a
//!    linear scan.
//!
//! All modes keep insertion order, so [`Set::elements`] is deterministic.
//! Binary operations build their result with the left operand's mode.

use std::{fmt, hash::Hash, rc::Rc};

use indexmap::IndexMap;

use crate::diagnostics::{BouquetError, Result};

type KeyFn<T, K> = Rc<dyn Fn(&T) -> K>;
type EqFn<T> = Rc<dyn Fn(&T, &T) -> bool>;

pub struct Set<T, K = T> {
    membership: Membership<T, K>,
}

enum Membership<T, K> {
    Keyed {
        key: KeyFn<T, K>,
        entries: IndexMap<K, T>,
    },
    Scan {
        eq: EqFn<T>,
        items: Vec<T>,
    },
}

impl<T> Set<T, T>
where
    T: Clone + Hash + Eq + 'static,
{
    pub fn new() -> Self {
        Self::keyed(T::clone)
    }
}

impl<T> Default for Set<T, T>
where
    T: Clone + Hash + Eq + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> Set<T, K> {
    /// Elements are equal when `key` extracts equal values from them.
    pub fn keyed(key: impl Fn(&T) -> K + 'static) -> Self {
        Self {
            membership: Membership::Keyed {
                key: Rc::new(key),
                entries: IndexMap::new(),
            },
        }
    }

    pub fn len(&self) -> usize {
        match &self.membership {
            Membership::Keyed { entries, .. } => entries.len(),
            Membership::Scan { items, .. } => items.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazy view over the stored elements; call again to restart.
    pub fn elements(&self) -> Elements<'_, T, K> {
        let inner = match &self.membership {
            Membership::Keyed { entries, .. } => ElementsInner::Keyed(entries.values()),
            Membership::Scan { items, .. } => ElementsInner::Scan(items.iter()),
        };
        Elements { inner }
    }

    pub fn for_each(&self, mut f: impl FnMut(&T)) {
        self.elements().for_each(|element| f(element));
    }

    /// An empty set sharing this set's equality.
    pub fn empty_like(&self) -> Self {
        let membership = match &self.membership {
            Membership::Keyed { key, .. } => Membership::Keyed {
                key: Rc::clone(key),
                entries: IndexMap::new(),
            },
            Membership::Scan { eq, .. } => Membership::Scan {
                eq: Rc::clone(eq),
                items: Vec::new(),
            },
        };
        Self { membership }
    }
}

impl<T> Set<T, ()> {
    /// Elements are equal when `eq` says so. Every operation scans.
    pub fn with_eq(eq: impl Fn(&T, &T) -> bool + 'static) -> Self {
        Self {
            membership: Membership::Scan {
                eq: Rc::new(eq),
                items: Vec::new(),
            },
        }
    }
}

impl<T, K> Set<T, K>
where
    T: Clone,
    K: Hash + Eq,
{
    /// Returns `false` and keeps the stored element if an equal one exists.
    pub fn insert(&mut self, value: T) -> bool {
        match &mut self.membership {
            Membership::Keyed { key, entries } => {
                let k = key(&value);
                if entries.contains_key(&k) {
                    return false;
                }
                entries.insert(k, value);
                true
            }
            Membership::Scan { eq, items } => {
                if items.iter().any(|item| eq(item, &value)) {
                    return false;
                }
                items.push(value);
                true
            }
        }
    }

    /// Removes and returns the stored element equal to `value`.
    pub fn delete(&mut self, value: &T) -> Option<T> {
        match &mut self.membership {
            Membership::Keyed { key, entries } => entries.shift_remove(&key(value)),
            Membership::Scan { eq, items } => {
                let position = items.iter().position(|item| eq(item, value))?;
                Some(items.remove(position))
            }
        }
    }

    /// The stored element equal to `value`, which may differ from `value`
    /// itself under keyed or custom equality.
    pub fn contains(&self, value: &T) -> Option<&T> {
        match &self.membership {
            Membership::Keyed { key, entries } => entries.get(&key(value)),
            Membership::Scan { eq, items } => items.iter().find(|item| eq(item, value)),
        }
    }

    /// Removes `count` elements and returns them as a new set.
    pub fn choose(&mut self, count: usize) -> Result<Self> {
        let available = self.len();
        if available < count {
            return Err(BouquetError::InsufficientElements {
                requested: count,
                available,
            });
        }
        let mut chosen = self.empty_like();
        for _ in 0..count {
            let element = match &mut self.membership {
                Membership::Keyed { entries, .. } => entries.pop().map(|(_, element)| element),
                Membership::Scan { items, .. } => items.pop(),
            };
            if let Some(element) = element {
                chosen.insert(element);
            }
        }
        Ok(chosen)
    }

    pub fn union<K2>(&self, other: &Set<T, K2>) -> Self {
        let mut result = self.empty_like();
        result.extend(self.elements().cloned());
        result.extend(other.elements().cloned());
        result
    }

    pub fn intersection<K2>(&self, other: &Set<T, K2>) -> Self
    where
        K2: Hash + Eq,
    {
        self.filter(|element| other.contains(element).is_some())
    }

    pub fn difference<K2>(&self, other: &Set<T, K2>) -> Self
    where
        K2: Hash + Eq,
    {
        self.filter(|element| other.contains(element).is_none())
    }

    /// Transforms every element; results that collide under this set's
    /// equality collapse into one.
    pub fn map(&self, f: impl Fn(&T) -> T) -> Self {
        let mut result = self.empty_like();
        for element in self.elements() {
            result.insert(f(element));
        }
        result
    }

    pub fn filter(&self, predicate: impl Fn(&T) -> bool) -> Self {
        let mut result = self.empty_like();
        for element in self.elements() {
            if predicate(element) {
                result.insert(element.clone());
            }
        }
        result
    }

    pub fn is_subset<K2>(&self, other: &Set<T, K2>) -> bool
    where
        K2: Hash + Eq,
    {
        self.elements().all(|element| other.contains(element).is_some())
    }
}

impl<T: Clone, K: Clone> Clone for Set<T, K> {
    fn clone(&self) -> Self {
        let membership = match &self.membership {
            Membership::Keyed { key, entries } => Membership::Keyed {
                key: Rc::clone(key),
                entries: entries.clone(),
            },
            Membership::Scan { eq, items } => Membership::Scan {
                eq: Rc::clone(eq),
                items: items.clone(),
            },
        };
        Self { membership }
    }
}

impl<T: fmt::Debug, K> fmt::Debug for Set<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.elements()).finish()
    }
}

impl<T, K> Extend<T> for Set<T, K>
where
    T: Clone,
    K: Hash + Eq,
{
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for element in iter {
            self.insert(element);
        }
    }
}

impl<T> FromIterator<T> for Set<T, T>
where
    T: Clone + Hash + Eq + 'static,
{
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut set = Set::new();
        set.extend(iter);
        set
    }
}

impl<'a, T, K> IntoIterator for &'a Set<T, K> {
    type Item = &'a T;
    type IntoIter = Elements<'a, T, K>;

    fn into_iter(self) -> Self::IntoIter {
        self.elements()
    }
}

pub struct Elements<'a, T, K> {
    inner: ElementsInner<'a, T, K>,
}

enum ElementsInner<'a, T, K> {
    Keyed(indexmap::map::Values<'a, K, T>),
    Scan(std::slice::Iter<'a, T>),
}

impl<'a, T, K> Iterator for Elements<'a, T, K> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.inner {
            ElementsInner::Keyed(values) => values.next(),
            ElementsInner::Scan(items) => items.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        match &self.inner {
            ElementsInner::Keyed(values) => values.size_hint(),
            ElementsInner::Scan(items) => items.size_hint(),
        }
    }
}
