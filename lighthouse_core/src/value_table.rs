//! Tabular action-value estimates indexed by [`StateKey`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use lighthouse_env::{Direction, StateKey};

use crate::error::StoreError;

/// Action-value estimates for every visited state.
///
/// Each row holds one estimate per action, aligned with [`ValueTable::actions`].
/// Rows are created on first visit with every action at `0.0` and are never
/// removed during a run.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTable {
    actions: Vec<Direction>,
    rows: HashMap<StateKey, Vec<f64>>,
}

/// On-disk form. JSON object keys must be strings, so rows are stored as a
/// sorted list of entries instead of a map.
#[derive(Serialize, Deserialize)]
struct TableFile {
    actions: Vec<Direction>,
    entries: Vec<TableEntry>,
}

#[derive(Serialize, Deserialize)]
struct TableEntry {
    state: StateKey,
    values: Vec<f64>,
}

impl ValueTable {
    /// Creates an empty table over the given action order.
    pub fn new(actions: Vec<Direction>) -> Self {
        Self {
            actions,
            rows: HashMap::new(),
        }
    }

    pub fn actions(&self) -> &[Direction] {
        &self.actions
    }

    /// Number of visited states.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The estimates for `state`, if it has been visited.
    pub fn get(&self, state: &StateKey) -> Option<&[f64]> {
        self.rows.get(state).map(Vec::as_slice)
    }

    /// The row for `state`, inserting a zeroed row on first visit.
    pub fn row_mut(&mut self, state: StateKey) -> &mut [f64] {
        let width = self.actions.len();
        self.rows.entry(state).or_insert_with(|| vec![0.0; width])
    }

    /// Highest estimate for `state` (visiting it if needed).
    pub fn max_value(&mut self, state: StateKey) -> f64 {
        self.row_mut(state)
            .iter()
            .copied()
            .fold(None, |best: Option<f64>, v| Some(best.map_or(v, |b| b.max(v))))
            .unwrap_or(0.0)
    }

    /// Index of the highest estimate for `state`; ties go to the earliest
    /// action in table order. Returns `None` for an empty action set.
    pub fn best_action(&mut self, state: StateKey) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for (index, value) in self.row_mut(state).iter().enumerate() {
            if best.map_or(true, |(_, top)| *value > top) {
                best = Some((index, *value));
            }
        }
        best.map(|(index, _)| index)
    }

    /// Iterates over visited states and their rows.
    pub fn iter(&self) -> impl Iterator<Item = (&StateKey, &[f64])> {
        self.rows.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Serializes the table to JSON bytes with rows in key order.
    pub fn to_bytes(&self) -> Result<Vec<u8>, StoreError> {
        let mut entries: Vec<TableEntry> = self
            .rows
            .iter()
            .map(|(state, values)| TableEntry {
                state: *state,
                values: values.clone(),
            })
            .collect();
        entries.sort_by(|a, b| a.state.cmp(&b.state));

        let file = TableFile {
            actions: self.actions.clone(),
            entries,
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    /// Restores a table written by [`ValueTable::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, StoreError> {
        let file: TableFile = serde_json::from_slice(bytes)?;
        let width = file.actions.len();
        let mut rows = HashMap::with_capacity(file.entries.len());

        for entry in file.entries {
            if entry.values.len() != width {
                return Err(StoreError::Incompatible(format!(
                    "state {} has {} values for {} actions",
                    entry.state,
                    entry.values.len(),
                    width
                )));
            }
            rows.insert(entry.state, entry.values);
        }

        Ok(Self {
            actions: file.actions,
            rows,
        })
    }
}

impl Default for ValueTable {
    fn default() -> Self {
        Self::new(Direction::ALL.to_vec())
    }
}
