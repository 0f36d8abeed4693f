//! ε-greedy controller learning which operator parameters pay off.
//!
//! Each generation the evolution loop reports the transition it observed
//! (state, action, reward, next state, next action) and the controller
//! applies either the Q-learning or the SARSA update to its table.

use log::trace;
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use super::action::ActionSpace;
use super::q_table::QTable;
use super::state::{relative_improvement, StateDiscretizer};

/// Learning rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RlVariant {
    /// Off-policy: bootstrap from the best next action
    QLearning,
    /// On-policy: bootstrap from the next action actually taken
    Sarsa,
    /// SARSA until generation `switch_at`, Q-learning afterwards
    SarsaThenQLearning { switch_at: usize },
}

/// Update rule applied to one transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateRule {
    QLearning,
    Sarsa,
}

impl RlVariant {
    /// Rule in effect at `generation`
    pub fn rule_at(&self, generation: usize) -> UpdateRule {
        match *self {
            RlVariant::QLearning => UpdateRule::QLearning,
            RlVariant::Sarsa => UpdateRule::Sarsa,
            RlVariant::SarsaThenQLearning { switch_at } => {
                if generation < switch_at { UpdateRule::Sarsa } else { UpdateRule::QLearning }
            }
        }
    }

    /// Short name used in reports and file names
    pub fn label(&self) -> &'static str {
        match self {
            RlVariant::QLearning => "q-learning",
            RlVariant::Sarsa => "sarsa",
            RlVariant::SarsaThenQLearning { .. } => "sarsa-then-q-learning",
        }
    }
}

/// How a generation's outcome becomes a reward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RewardShaping {
    /// Relative improvement of the best fitness
    Relative,
    /// +1 on strict improvement
    Binary,
}

/// Reinforcement learning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RLConfig {
    pub variant: RlVariant,
    /// Learning rate α
    pub learning_rate: f64,
    /// Discount factor γ
    pub discount_factor: f64,
    /// Initial exploration rate ε
    pub epsilon: f64,
    /// Multiplicative ε decay per generation
    pub epsilon_decay: f64,
    /// Lower bound of ε
    pub epsilon_min: f64,
    pub action_space: ActionSpace,
    pub reward: RewardShaping,
    /// Subtracted from the reward of every generation without strict improvement
    pub stagnation_penalty: f64,
    pub discretizer: StateDiscretizer,
}

impl Default for RLConfig {
    fn default() -> Self {
        RLConfig {
            variant: RlVariant::QLearning,
            learning_rate: 0.1,
            discount_factor: 0.9,
            epsilon: 0.3,
            epsilon_decay: 0.99,
            epsilon_min: 0.01,
            action_space: ActionSpace::default(),
            reward: RewardShaping::Relative,
            stagnation_penalty: 0.0,
            discretizer: StateDiscretizer::default(),
        }
    }
}

impl RLConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(SolverError::InvalidConfig(format!(
                "learning rate {} outside (0, 1]", self.learning_rate
            )));
        }
        if !(0.0..=1.0).contains(&self.discount_factor) {
            return Err(SolverError::InvalidConfig(format!(
                "discount factor {} outside [0, 1]", self.discount_factor
            )));
        }
        for (value, what) in [
            (self.epsilon, "epsilon"),
            (self.epsilon_decay, "epsilon decay"),
            (self.epsilon_min, "epsilon floor"),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(SolverError::InvalidConfig(format!("{} {} outside [0, 1]", what, value)));
            }
        }
        if self.stagnation_penalty.is_nan() || self.stagnation_penalty < 0.0 {
            return Err(SolverError::InvalidConfig("stagnation penalty must be non-negative".into()));
        }
        self.action_space.validate()?;
        self.discretizer.validate()
    }
}

/// Controller state for one run: configuration, Q-table and current ε
#[derive(Debug, Clone)]
pub struct RlController {
    config: RLConfig,
    q_table: QTable,
    epsilon: f64,
}

impl RlController {
    pub fn new(config: RLConfig) -> Self {
        let q_table = QTable::new(config.action_space.len());
        let epsilon = config.epsilon;
        RlController { config, q_table, epsilon }
    }

    /// Controller starting from a previously learned table
    pub fn with_q_table(config: RLConfig, q_table: QTable) -> Result<Self> {
        if q_table.num_actions() != config.action_space.len() {
            return Err(SolverError::InvalidConfig(format!(
                "Q-table has {} actions, the action space has {}",
                q_table.num_actions(), config.action_space.len()
            )));
        }
        q_table.validate()?;
        let epsilon = config.epsilon;
        Ok(RlController { config, q_table, epsilon })
    }

    pub fn config(&self) -> &RLConfig {
        &self.config
    }

    pub fn q_table(&self) -> &QTable {
        &self.q_table
    }

    #[inline]
    pub fn epsilon(&self) -> f64 {
        self.epsilon
    }

    /// Uniformly random action
    pub fn explore<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.q_table.num_actions())
    }

    /// ε-greedy choice; greedy ties are broken at random
    pub fn choose_action<R: Rng + ?Sized>(&self, state: usize, rng: &mut R) -> usize {
        if rng.gen::<f64>() < self.epsilon {
            return self.explore(rng);
        }
        let best = self.q_table.best_actions(state);
        best.choose(rng).copied().unwrap_or(0)
    }

    /// Reward for a generation that moved the best fitness from `previous`
    /// to `current` (lower is better).
    pub fn reward(&self, previous: f64, current: f64) -> f64 {
        let improved = current < previous;
        let penalty = if improved { 0.0 } else { self.config.stagnation_penalty };
        match self.config.reward {
            RewardShaping::Relative => relative_improvement(previous, current) - penalty,
            RewardShaping::Binary => {
                if improved { 1.0 } else { -penalty }
            }
        }
    }

    /// Apply the learning update for one transition and return the new
    /// value of `Q(state, action)`.
    pub fn update(
        &mut self,
        state: usize,
        action: usize,
        reward: f64,
        next_state: usize,
        next_action: usize,
        generation: usize,
    ) -> f64 {
        let rule = self.config.variant.rule_at(generation);
        let bootstrap = match rule {
            UpdateRule::QLearning => self.q_table.max_value(next_state),
            UpdateRule::Sarsa => self.q_table.get(next_state, next_action),
        };
        let target = reward + self.config.discount_factor * bootstrap;
        let current = self.q_table.get(state, action);
        let updated = current + self.config.learning_rate * (target - current);

        self.q_table.set(state, action, updated);
        self.q_table.record_visit(state, action);

        trace!(
            "{:?} update Q({}, {}) {:.5} -> {:.5} (reward {:.5}, target {:.5})",
            rule, state, action, current, updated, reward, target
        );
        updated
    }

    /// Multiply ε by the decay factor, never going below the floor
    pub fn decay_epsilon(&mut self) {
        self.epsilon = (self.epsilon * self.config.epsilon_decay).max(self.config.epsilon_min);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand_chacha::ChaCha8Rng;

    fn controller(variant: RlVariant) -> RlController {
        RlController::new(RLConfig {
            variant,
            learning_rate: 0.5,
            discount_factor: 0.9,
            ..Default::default()
        })
    }

    #[test]
    fn test_reward_sign() {
        let relative = controller(RlVariant::QLearning);
        assert!(relative.reward(100.0, 90.0) > 0.0);
        assert!(relative.reward(100.0, 100.0) <= 0.0);
        assert!(relative.reward(100.0, 110.0) <= 0.0);

        let binary = RlController::new(RLConfig {
            reward: RewardShaping::Binary,
            stagnation_penalty: 0.1,
            ..Default::default()
        });
        assert_eq!(binary.reward(10.0, 9.0), 1.0);
        assert_eq!(binary.reward(10.0, 10.0), -0.1);

        let penalised = RlController::new(RLConfig { stagnation_penalty: 0.2, ..Default::default() });
        assert!((penalised.reward(50.0, 50.0) + 0.2).abs() < 1e-12);
        assert!(penalised.reward(50.0, 45.0) > 0.0);
    }

    #[test]
    fn test_q_learning_bootstraps_from_best_next_action() {
        let mut c = controller(RlVariant::QLearning);
        c.q_table.set(1, 0, 2.0);
        c.q_table.set(1, 1, 10.0);

        // target = 1 + 0.9 * 10 = 10, Q = 0 + 0.5 * 10
        let q = c.update(0, 0, 1.0, 1, 0, 0);
        assert!((q - 5.0).abs() < 1e-12);
        assert_eq!(c.q_table.visits(0, 0), 1);
    }

    #[test]
    fn test_sarsa_bootstraps_from_taken_action() {
        let mut c = controller(RlVariant::Sarsa);
        c.q_table.set(1, 0, 2.0);
        c.q_table.set(1, 1, 10.0);

        // target = 1 + 0.9 * 2 = 2.8, Q = 0 + 0.5 * 2.8
        let q = c.update(0, 0, 1.0, 1, 0, 0);
        assert!((q - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_switch_variant() {
        let variant = RlVariant::SarsaThenQLearning { switch_at: 10 };
        assert_eq!(variant.rule_at(9), UpdateRule::Sarsa);
        assert_eq!(variant.rule_at(10), UpdateRule::QLearning);
        assert_eq!(variant.label(), "sarsa-then-q-learning");
    }

    #[test]
    fn test_epsilon_decay_floor() {
        let mut c = RlController::new(RLConfig {
            epsilon: 0.5,
            epsilon_decay: 0.5,
            epsilon_min: 0.1,
            ..Default::default()
        });
        c.decay_epsilon();
        assert!((c.epsilon() - 0.25).abs() < 1e-12);
        for _ in 0..10 {
            c.decay_epsilon();
        }
        assert!((c.epsilon() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_greedy_choice_without_exploration() {
        let mut c = RlController::new(RLConfig { epsilon: 0.0, ..Default::default() });
        c.q_table.set(2, 5, 1.0);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for _ in 0..20 {
            assert_eq!(c.choose_action(2, &mut rng), 5);
        }
    }

    #[test]
    fn test_greedy_action_stabilises() {
        // Action 3 always pays, the others never do
        let mut c = RlController::new(RLConfig {
            learning_rate: 0.5,
            epsilon: 1.0,
            epsilon_decay: 0.9,
            epsilon_min: 0.05,
            ..Default::default()
        });
        let mut rng = ChaCha8Rng::seed_from_u64(21);
        let mut action = c.explore(&mut rng);
        let mut greedy = Vec::new();

        for generation in 0..300 {
            let reward = if action == 3 { 1.0 } else { 0.0 };
            let next_action = c.choose_action(0, &mut rng);
            c.update(0, action, reward, 0, next_action, generation);
            c.decay_epsilon();
            action = next_action;
            greedy.push(c.q_table().greedy_action(0));
        }

        assert!(greedy[200..].iter().all(|&a| a == 3));
        assert_eq!(c.q_table().most_visited_state(), Some(0));
    }

    #[test]
    fn test_warm_start_from_table() {
        let config = RLConfig::default();
        let mut table = QTable::new(config.action_space.len());
        table.set(4, 2, 0.7);

        let c = RlController::with_q_table(config.clone(), table).unwrap();
        assert_eq!(c.q_table().greedy_action(4), 2);

        let mismatched = QTable::new(2);
        assert!(matches!(
            RlController::with_q_table(config.clone(), mismatched),
            Err(SolverError::InvalidConfig(_))
        ));

        let truncated: QTable = serde_json::from_str(&format!(
            r#"{{"num_actions":{},"values":{{"0":[0.5]}},"visits":{{}}}}"#,
            config.action_space.len()
        )).unwrap();
        assert!(matches!(
            RlController::with_q_table(config, truncated),
            Err(SolverError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate() {
        assert!(RLConfig::default().validate().is_ok());
        assert!(RLConfig { learning_rate: 0.0, ..Default::default() }.validate().is_err());
        assert!(RLConfig { discount_factor: 1.5, ..Default::default() }.validate().is_err());
        assert!(RLConfig { epsilon: -0.1, ..Default::default() }.validate().is_err());
        assert!(RLConfig { stagnation_penalty: -1.0, ..Default::default() }.validate().is_err());
    }
}
