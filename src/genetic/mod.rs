//! Genetic algorithm module for FJSSP.
//!
//! This module exports the chromosome codec, the genetic operators and the
//! RL-driven evolution loop.

pub mod chromosome;
pub mod operators;
pub mod evolution;

pub use chromosome::{Chromosome, DecodeStrategy, MachineInit};
pub use operators::{MachineCrossover, MachineMutation, SelectionType};
pub use evolution::{AdaptiveGeneticAlgorithm, GAConfig, GenerationOutcome, GenerationRecord, Individual, OptimizationResult};
