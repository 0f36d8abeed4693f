//! FJSSP RL Solver Library
//!
//! A solver for the Flexible Job Shop Scheduling Problem (FJSSP) built on a
//! genetic algorithm whose crossover rate, mutation rate and selection
//! pressure are tuned online by a reinforcement learning controller.
//!
//! # Features
//!
//! - `.fjs` instance parsing and validation
//! - Two-gene chromosomes (operation sequence + machine assignment) with
//!   semi-active and insertion decoders
//! - POX/JOX crossover, swap/neighbourhood mutation, machine-gene operators
//! - Q-learning, SARSA, and SARSA switching to Q-learning
//! - Seeded benchmarking of the variants and SVG visualization
//!
//! # Example
//!
//! ```no_run
//! use fjssp_rl_solver::instance::FjsspInstance;
//! use fjssp_rl_solver::genetic::{AdaptiveGeneticAlgorithm, GAConfig};
//! use fjssp_rl_solver::rl::{RLConfig, RlVariant};
//!
//! // Load instance
//! let instance = FjsspInstance::from_file("mk01.fjs").unwrap();
//!
//! // Learn operator parameters with SARSA
//! let config = GAConfig {
//!     rl: RLConfig { variant: RlVariant::Sarsa, ..Default::default() },
//!     ..Default::default()
//! };
//! let mut ga = AdaptiveGeneticAlgorithm::new(instance, config).unwrap();
//! let result = ga.run().unwrap();
//!
//! println!("Makespan: {}", result.makespan());
//! ```

pub mod error;
pub mod instance;
pub mod schedule;
pub mod fitness;
pub mod genetic;
pub mod rl;
pub mod benchmark;
pub mod visualization;

pub use error::{Result, SolverError};
pub use instance::FjsspInstance;
pub use schedule::Schedule;
pub use genetic::{AdaptiveGeneticAlgorithm, GAConfig, OptimizationResult};
pub use rl::{RLConfig, RlVariant};
