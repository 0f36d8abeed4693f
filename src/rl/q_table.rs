//! Tabular action values.
//!
//! Rows are created lazily the first time a state is written, so the table
//! only ever holds states the run actually visited. Unvisited entries read
//! as 0.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QTable {
    num_actions: usize,
    values: HashMap<usize, Vec<f64>>,
    visits: HashMap<usize, Vec<u64>>,
}

impl QTable {
    pub fn new(num_actions: usize) -> Self {
        QTable {
            num_actions,
            values: HashMap::new(),
            visits: HashMap::new(),
        }
    }

    #[inline]
    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// Number of states with a row
    pub fn num_states(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, state: usize, action: usize) -> f64 {
        self.values.get(&state).map(|row| row[action]).unwrap_or(0.0)
    }

    /// Action values of `state` (zeros when the state was never written)
    pub fn row(&self, state: usize) -> Vec<f64> {
        self.values.get(&state)
            .cloned()
            .unwrap_or_else(|| vec![0.0; self.num_actions])
    }

    pub fn set(&mut self, state: usize, action: usize, value: f64) {
        let num_actions = self.num_actions;
        self.values.entry(state).or_insert_with(|| vec![0.0; num_actions])[action] = value;
    }

    /// Largest action value of `state`
    pub fn max_value(&self, state: usize) -> f64 {
        match self.values.get(&state) {
            Some(row) => row.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            None => 0.0,
        }
    }

    /// Indices of every action reaching the maximum value of `state`
    pub fn best_actions(&self, state: usize) -> Vec<usize> {
        let best = self.max_value(state);
        (0..self.num_actions)
            .filter(|&a| self.get(state, a) == best)
            .collect()
    }

    /// Greedy action of `state`, the lowest index on ties
    pub fn greedy_action(&self, state: usize) -> usize {
        (0..self.num_actions)
            .min_by_key(|&a| (std::cmp::Reverse(OrderedFloat(self.get(state, a))), a))
            .unwrap_or(0)
    }

    pub fn record_visit(&mut self, state: usize, action: usize) {
        let num_actions = self.num_actions;
        self.visits.entry(state).or_insert_with(|| vec![0; num_actions])[action] += 1;
    }

    pub fn visits(&self, state: usize, action: usize) -> u64 {
        self.visits.get(&state).map(|row| row[action]).unwrap_or(0)
    }

    /// Total visits of `state` over all actions
    pub fn state_visits(&self, state: usize) -> u64 {
        self.visits.get(&state).map(|row| row.iter().sum()).unwrap_or(0)
    }

    /// State with the most recorded visits (lowest index on ties)
    pub fn most_visited_state(&self) -> Option<usize> {
        self.visits.keys()
            .copied()
            .max_by_key(|&s| (self.state_visits(s), std::cmp::Reverse(s)))
    }

    /// Write the table as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    /// Check that every stored row has one entry per action
    pub fn validate(&self) -> Result<()> {
        let rows = self.values.iter().map(|(s, row)| ("values", s, row.len()))
            .chain(self.visits.iter().map(|(s, row)| ("visits", s, row.len())));
        for (what, state, len) in rows {
            if len != self.num_actions {
                return Err(SolverError::InvalidConfig(format!(
                    "Q-table {} row of state {} has {} entries, expected {}",
                    what, state, len, self.num_actions
                )));
            }
        }
        Ok(())
    }

    /// Read a table written by [`QTable::save`]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let table: QTable = serde_json::from_reader(reader)?;
        table.validate()?;
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lazy_rows() {
        let mut table = QTable::new(3);
        assert_eq!(table.num_states(), 0);
        assert_eq!(table.get(7, 2), 0.0);
        assert_eq!(table.row(7), vec![0.0; 3]);

        table.set(7, 1, 0.5);
        assert_eq!(table.num_states(), 1);
        assert_eq!(table.get(7, 1), 0.5);
        assert_eq!(table.max_value(7), 0.5);
        assert_eq!(table.max_value(8), 0.0);
    }

    #[test]
    fn test_greedy_and_ties() {
        let mut table = QTable::new(4);
        assert_eq!(table.greedy_action(0), 0);
        assert_eq!(table.best_actions(0), vec![0, 1, 2, 3]);

        table.set(0, 2, 1.0);
        table.set(0, 3, 1.0);
        assert_eq!(table.greedy_action(0), 2);
        assert_eq!(table.best_actions(0), vec![2, 3]);

        table.set(1, 0, -1.0);
        assert_eq!(table.greedy_action(1), 1);
    }

    #[test]
    fn test_visits() {
        let mut table = QTable::new(2);
        table.record_visit(3, 0);
        table.record_visit(3, 1);
        table.record_visit(5, 1);

        assert_eq!(table.visits(3, 1), 1);
        assert_eq!(table.state_visits(3), 2);
        assert_eq!(table.most_visited_state(), Some(3));
        assert_eq!(QTable::new(2).most_visited_state(), None);
    }

    #[test]
    fn test_save_and_load() {
        let mut table = QTable::new(2);
        table.set(4, 1, 0.25);
        table.record_visit(4, 1);

        let path = std::env::temp_dir().join(format!("q_table_test_{}.json", std::process::id()));
        table.save(&path).unwrap();
        let loaded = QTable::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(loaded.get(4, 1), 0.25);
        assert_eq!(loaded.visits(4, 1), 1);
        assert_eq!(loaded.num_actions(), 2);
    }

    #[test]
    fn test_rejects_truncated_rows() {
        let path = std::env::temp_dir().join(format!("q_table_short_{}.json", std::process::id()));
        std::fs::write(&path, r#"{"num_actions":18,"values":{"0":[0.5]},"visits":{}}"#).unwrap();
        let loaded = QTable::load(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(loaded, Err(SolverError::InvalidConfig(_))));

        let visits: QTable =
            serde_json::from_str(r#"{"num_actions":2,"values":{"1":[0.0,1.0]},"visits":{"1":[3]}}"#).unwrap();
        assert!(matches!(visits.validate(), Err(SolverError::InvalidConfig(_))));
    }
}
