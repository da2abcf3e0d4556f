// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Thread-safe keyed table standing in for a hosted row store.
//!
//! Every write to an existing row goes through [`Table::update`], which runs
//! the mutation while holding that row's guard. This is the conditional
//! update primitive the workflows rely on: the closure re-reads the row,
//! checks its precondition and mutates only if the check passes.

use crate::WorkflowError;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::hash::Hash;

/// A concurrent table of rows keyed by `K`.
///
/// Different rows can be written in parallel. Writes to one row are
/// linearized by its shard lock.
#[derive(Debug)]
pub struct Table<K, V>
where
    K: Eq + Hash,
{
    rows: DashMap<K, V>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    pub fn new() -> Self {
        Self {
            rows: DashMap::new(),
        }
    }

    /// Inserts a new row.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::DuplicateRecord`] if the key is taken.
    pub fn insert(&self, key: K, value: V) -> Result<(), WorkflowError> {
        // Entry API makes the check-and-insert atomic.
        match self.rows.entry(key) {
            Entry::Occupied(_) => Err(WorkflowError::DuplicateRecord),
            Entry::Vacant(entry) => {
                entry.insert(value);
                Ok(())
            }
        }
    }

    /// Point read. Returns a snapshot of the row.
    pub fn get(&self, key: &K) -> Option<V> {
        self.rows.get(key).map(|row| row.value().clone())
    }

    pub fn contains(&self, key: &K) -> bool {
        self.rows.contains_key(key)
    }

    /// Snapshot of every row matching `predicate`, in no particular order.
    pub fn filter<P>(&self, predicate: P) -> Vec<V>
    where
        P: Fn(&V) -> bool,
    {
        self.rows
            .iter()
            .filter(|row| predicate(row.value()))
            .map(|row| row.value().clone())
            .collect()
    }

    /// Runs `mutate` against the row under its write guard.
    ///
    /// The closure must leave the row untouched when it returns an error, so
    /// a failed update is never observable.
    ///
    /// # Errors
    ///
    /// Returns [`WorkflowError::NotFound`] for a missing key, or whatever the
    /// closure returns.
    pub fn update<T, F>(&self, key: &K, mutate: F) -> Result<T, WorkflowError>
    where
        F: FnOnce(&mut V) -> Result<T, WorkflowError>,
    {
        let mut row = self.rows.get_mut(key).ok_or(WorkflowError::NotFound)?;
        mutate(row.value_mut())
    }

    /// Removes rows matching `predicate` and returns them.
    pub fn remove_where<P>(&self, predicate: P) -> Vec<V>
    where
        P: Fn(&V) -> bool,
    {
        let mut removed = Vec::new();
        self.rows.retain(|_, value| {
            if predicate(value) {
                removed.push(value.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    /// Deletes a row only if `predicate` holds for it at removal time.
    pub fn remove_if<P>(&self, key: &K, predicate: P) -> Option<V>
    where
        P: FnOnce(&V) -> bool,
    {
        self.rows
            .remove_if(key, |_, value| predicate(value))
            .map(|(_, value)| value)
    }

    /// Deletes a row.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.rows.remove(key).map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl<K, V> Default for Table<K, V>
where
    K: Eq + Hash + Copy,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}
