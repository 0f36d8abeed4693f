//! Population statistics and their discretization into RL states.
//!
//! A state combines three bucketed features:
//! - relative improvement of the best fitness over the last generation
//! - fitness diversity, measured as the coefficient of variation
//! - the stagnation counter (generations without a new global best)
//!
//! Each feature is bucketed by an ascending list of thresholds: the bucket is
//! the number of thresholds the value reaches. The state index is the
//! mixed-radix combination of the three buckets.

use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::fitness::Fitness;

/// Summary of one generation's fitness values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PopulationStatistics {
    pub best: f64,
    pub mean: f64,
    pub worst: f64,
    pub std_dev: f64,
    /// Coefficient of variation (std dev / mean), 0 when the mean is 0
    pub diversity: f64,
}

impl PopulationStatistics {
    pub fn from_fitness(fitness: &[Fitness]) -> Self {
        if fitness.is_empty() {
            return PopulationStatistics { best: 0.0, mean: 0.0, worst: 0.0, std_dev: 0.0, diversity: 0.0 };
        }

        let n = fitness.len() as f64;
        let values = fitness.iter().map(|f| f.value);
        let best = values.clone().fold(f64::INFINITY, f64::min);
        let worst = values.clone().fold(f64::NEG_INFINITY, f64::max);
        let mean = values.clone().sum::<f64>() / n;
        let variance = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let std_dev = variance.sqrt();
        let diversity = if mean.abs() > f64::EPSILON { std_dev / mean.abs() } else { 0.0 };

        PopulationStatistics { best, mean, worst, std_dev, diversity }
    }
}

/// Relative improvement from `previous` to `current` (positive when the
/// value decreased), 0 when `previous` is 0.
pub fn relative_improvement(previous: f64, current: f64) -> f64 {
    if previous.abs() <= f64::EPSILON {
        0.0
    } else {
        (previous - current) / previous.abs()
    }
}

/// Bucketed view of the GA's progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RlState {
    pub improvement: usize,
    pub diversity: usize,
    pub stagnation: usize,
}

/// Thresholds used to bucket the state features
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDiscretizer {
    pub improvement_thresholds: Vec<f64>,
    pub diversity_thresholds: Vec<f64>,
    pub stagnation_thresholds: Vec<usize>,
}

impl Default for StateDiscretizer {
    fn default() -> Self {
        StateDiscretizer {
            improvement_thresholds: vec![1e-9, 0.01, 0.05],
            diversity_thresholds: vec![0.01, 0.05, 0.15],
            stagnation_thresholds: vec![1, 5, 15],
        }
    }
}

fn bucket<T: PartialOrd + Copy>(value: T, thresholds: &[T]) -> usize {
    thresholds.iter().filter(|&&t| value >= t).count()
}

fn is_ascending<T: PartialOrd>(values: &[T]) -> bool {
    values.windows(2).all(|w| w[0] < w[1])
}

impl StateDiscretizer {
    pub fn validate(&self) -> Result<()> {
        if !is_ascending(&self.improvement_thresholds)
            || !is_ascending(&self.diversity_thresholds)
            || !is_ascending(&self.stagnation_thresholds)
        {
            return Err(SolverError::InvalidConfig(
                "state thresholds must be strictly ascending".into(),
            ));
        }
        if self.improvement_thresholds.iter().chain(&self.diversity_thresholds).any(|t| !t.is_finite()) {
            return Err(SolverError::InvalidConfig("state thresholds must be finite".into()));
        }
        Ok(())
    }

    /// Number of distinct states
    pub fn num_states(&self) -> usize {
        (self.improvement_thresholds.len() + 1)
            * (self.diversity_thresholds.len() + 1)
            * (self.stagnation_thresholds.len() + 1)
    }

    pub fn discretize(&self, improvement: f64, diversity: f64, stagnation: usize) -> RlState {
        RlState {
            improvement: bucket(improvement, &self.improvement_thresholds),
            diversity: bucket(diversity, &self.diversity_thresholds),
            stagnation: bucket(stagnation, &self.stagnation_thresholds),
        }
    }

    /// Mixed-radix index of a state, in `0..num_states()`
    pub fn index(&self, state: RlState) -> usize {
        let improvement_radix = self.improvement_thresholds.len() + 1;
        let diversity_radix = self.diversity_thresholds.len() + 1;
        state.improvement + improvement_radix * (state.diversity + diversity_radix * state.stagnation)
    }

    /// Inverse of [`StateDiscretizer::index`]
    pub fn state_at(&self, index: usize) -> RlState {
        let improvement_radix = self.improvement_thresholds.len() + 1;
        let diversity_radix = self.diversity_thresholds.len() + 1;
        RlState {
            improvement: index % improvement_radix,
            diversity: (index / improvement_radix) % diversity_radix,
            stagnation: index / (improvement_radix * diversity_radix),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fitness(values: &[f64]) -> Vec<Fitness> {
        values.iter().map(|&value| Fitness { value, makespan: value as u64, secondary: 0.0 }).collect()
    }

    #[test]
    fn test_population_statistics() {
        let stats = PopulationStatistics::from_fitness(&fitness(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]));
        assert_eq!(stats.best, 2.0);
        assert_eq!(stats.worst, 9.0);
        assert!((stats.mean - 5.0).abs() < 1e-12);
        assert!((stats.std_dev - 2.0).abs() < 1e-12);
        assert!((stats.diversity - 0.4).abs() < 1e-12);

        let uniform = PopulationStatistics::from_fitness(&fitness(&[3.0; 4]));
        assert_eq!(uniform.diversity, 0.0);
    }

    #[test]
    fn test_relative_improvement() {
        assert!((relative_improvement(100.0, 90.0) - 0.1).abs() < 1e-12);
        assert!(relative_improvement(100.0, 110.0) < 0.0);
        assert_eq!(relative_improvement(0.0, 0.0), 0.0);
    }

    #[test]
    fn test_discretize() {
        let discretizer = StateDiscretizer::default();

        let idle = discretizer.discretize(0.0, 0.0, 0);
        assert_eq!(idle, RlState { improvement: 0, diversity: 0, stagnation: 0 });

        let busy = discretizer.discretize(0.02, 0.2, 7);
        assert_eq!(busy, RlState { improvement: 2, diversity: 3, stagnation: 2 });

        let stuck = discretizer.discretize(0.0, 0.03, 40);
        assert_eq!(stuck, RlState { improvement: 0, diversity: 1, stagnation: 3 });
    }

    #[test]
    fn test_index_round_trip_covers_space() {
        let discretizer = StateDiscretizer::default();
        assert_eq!(discretizer.num_states(), 64);

        let mut seen = std::collections::HashSet::new();
        for index in 0..discretizer.num_states() {
            let state = discretizer.state_at(index);
            assert_eq!(discretizer.index(state), index);
            seen.insert(state);
        }
        assert_eq!(seen.len(), 64);
    }

    #[test]
    fn test_validate_thresholds() {
        let mut discretizer = StateDiscretizer::default();
        assert!(discretizer.validate().is_ok());

        discretizer.diversity_thresholds = vec![0.1, 0.05];
        assert!(matches!(discretizer.validate(), Err(SolverError::InvalidConfig(_))));

        let single = StateDiscretizer {
            improvement_thresholds: vec![],
            diversity_thresholds: vec![],
            stagnation_thresholds: vec![],
        };
        assert_eq!(single.num_states(), 1);
        assert_eq!(single.index(single.discretize(0.5, 0.5, 3)), 0);
    }
}
