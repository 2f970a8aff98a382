//! Name-unique arenas addressed by typed handles.
//!
//! Markers and quantities are owned by exactly one [`Registry`] inside the
//! timeline. Channels and intervals hold handles into it, never copies, so an
//! edit to a shared quantity is seen by every interval that references it.

use std::fmt;
use std::hash::Hash;

use indexmap::IndexMap;

use crate::error::ModelError;
use crate::types::EntityKind;

/// A handle type minted by a [`Registry`].
pub trait Handle: Copy + Eq + Hash + fmt::Debug {
    fn from_raw(raw: u32) -> Self;
}

/// An entity that lives in a name-unique namespace.
pub trait Named {
    /// Namespace label used in errors.
    const KIND: EntityKind;

    fn name(&self) -> &str;
}

/// Insertion-ordered arena with unique names.
#[derive(Debug, Clone)]
pub struct Registry<K, T> {
    entries: IndexMap<K, T>,
    next: u32,
}

impl<K, T> Default for Registry<K, T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            next: 0,
        }
    }
}

impl<K: Handle, T: Named> Registry<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `item` under a fresh handle.
    pub(crate) fn insert(&mut self, item: T) -> Result<K, ModelError> {
        if self.contains_name(item.name()) {
            return Err(ModelError::name_conflict(T::KIND, item.name()));
        }
        let id = K::from_raw(self.next);
        self.next += 1;
        self.entries.insert(id, item);
        Ok(id)
    }

    /// Removes an entry, preserving the order of the rest.
    pub(crate) fn remove(&mut self, id: K) -> Option<T> {
        self.entries.shift_remove(&id)
    }

    pub fn get(&self, id: K) -> Option<&T> {
        self.entries.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: K) -> Option<&mut T> {
        self.entries.get_mut(&id)
    }

    pub fn contains(&self, id: K) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.id_of(name).is_some()
    }

    /// Handle of the entry called `name`, if any.
    pub fn id_of(&self, name: &str) -> Option<K> {
        self.entries
            .iter()
            .find(|(_, item)| item.name() == name)
            .map(|(id, _)| *id)
    }

    /// Looks an entry up by name, failing with `NotFound`.
    pub fn named(&self, name: &str) -> Result<(K, &T), ModelError> {
        self.entries
            .iter()
            .find(|(_, item)| item.name() == name)
            .map(|(id, item)| (*id, item))
            .ok_or_else(|| ModelError::not_found(T::KIND, name))
    }

    /// Name of the entry behind `id`, or its handle when it is gone.
    pub fn name_of(&self, id: K) -> String {
        self.get(id)
            .map_or_else(|| format!("{id:?}"), |item| item.name().to_string())
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &T)> {
        self.entries.iter().map(|(id, item)| (*id, item))
    }

    pub fn ids(&self) -> impl Iterator<Item = K> + '_ {
        self.entries.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Keeps only the entries for which `keep` returns true, returning the
    /// removed ones in registry order.
    pub(crate) fn retain_ids(&mut self, mut keep: impl FnMut(K) -> bool) -> Vec<(K, T)> {
        let doomed: Vec<K> = self.ids().filter(|id| !keep(*id)).collect();
        doomed
            .into_iter()
            .filter_map(|id| self.entries.shift_remove(&id).map(|item| (id, item)))
            .collect()
    }
}
