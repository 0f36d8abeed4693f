//! Reinforcement learning control of the GA's operator parameters.
//!
//! This module includes:
//! - State discretization from population statistics
//! - The closed action set and the parameters each action yields
//! - A lazily grown Q-table
//! - The ε-greedy controller with Q-learning and SARSA updates

pub mod state;
pub mod action;
pub mod q_table;
pub mod controller;

pub use state::{PopulationStatistics, RlState, StateDiscretizer};
pub use action::{Action, ActionSpace, OperatorParameters};
pub use q_table::QTable;
pub use controller::{RLConfig, RewardShaping, RlController, RlVariant, UpdateRule};
