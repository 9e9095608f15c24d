// SPDX-License-Identifier: MPL-2.0

//! A map that avoids heap allocation for up to two entries and keeps
//! insertion order, so that iteration over incompatibility terms is
//! deterministic across runs.

use std::fmt;

#[derive(Clone)]
pub(crate) enum SmallMap<K, V> {
    Empty,
    One([(K, V); 1]),
    Two([(K, V); 2]),
    Flexible(Vec<(K, V)>),
}

impl<K: PartialEq, V> SmallMap<K, V> {
    pub(crate) fn get(&self, key: &K) -> Option<&V> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    pub(crate) fn insert(&mut self, key: K, value: V) {
        if let Some(slot) = self.get_mut(&key) {
            *slot = value;
            return;
        }
        *self = match std::mem::take(self) {
            Self::Empty => Self::One([(key, value)]),
            Self::One([e1]) => Self::Two([e1, (key, value)]),
            Self::Two([e1, e2]) => Self::Flexible(vec![e1, e2, (key, value)]),
            Self::Flexible(mut entries) => {
                entries.push((key, value));
                Self::Flexible(entries)
            }
        };
    }

    pub(crate) fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.iter().position(|(k, _)| k == key)?;
        let (_, value) = match std::mem::take(self) {
            Self::Empty => unreachable!("a key was found in an empty map"),
            Self::One([e1]) => {
                *self = Self::Empty;
                e1
            }
            Self::Two([e1, e2]) => {
                let (removed, kept) = if index == 0 { (e1, e2) } else { (e2, e1) };
                *self = Self::One([kept]);
                removed
            }
            Self::Flexible(mut entries) => {
                let removed = entries.remove(index);
                *self = Self::Flexible(entries);
                removed
            }
        };
        Some(value)
    }

    fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        self.as_mut_slice()
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Merge the entries of `other` into `self`. For keys present on both
    /// sides, `value_merger` decides the outcome; `None` removes the entry.
    pub(crate) fn merge<'a>(
        &'a mut self,
        other: impl Iterator<Item = (&'a K, &'a V)>,
        mut value_merger: impl FnMut(&V, &V) -> Option<V>,
    ) where
        K: Clone,
        V: Clone,
    {
        for (key, other_value) in other {
            match self.get(key).map(|value| value_merger(value, other_value)) {
                Some(Some(merged)) => self.insert(key.clone(), merged),
                Some(None) => {
                    self.remove(key);
                }
                None => self.insert(key.clone(), other_value.clone()),
            }
        }
    }
}

impl<K, V> SmallMap<K, V> {
    pub(crate) fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.as_slice().iter().map(|(k, v)| (k, v))
    }

    fn as_slice(&self) -> &[(K, V)] {
        match self {
            Self::Empty => &[],
            Self::One(entries) => entries,
            Self::Two(entries) => entries,
            Self::Flexible(entries) => entries,
        }
    }

    fn as_mut_slice(&mut self) -> &mut [(K, V)] {
        match self {
            Self::Empty => &mut [],
            Self::One(entries) => entries,
            Self::Two(entries) => entries,
            Self::Flexible(entries) => entries,
        }
    }
}

impl<K: Ord + Clone, V: Clone> SmallMap<K, V> {
    /// Copy the entries into an ordered map, for reporting.
    pub(crate) fn as_map(&self) -> std::collections::BTreeMap<K, V> {
        self.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl<K, V> Default for SmallMap<K, V> {
    fn default() -> Self {
        Self::Empty
    }
}

impl<K, V> FromIterator<(K, V)> for SmallMap<K, V>
where
    K: PartialEq,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::Empty;
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for SmallMap<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}
