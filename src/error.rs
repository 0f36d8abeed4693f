//! Error types for the FJSSP solver.

use thiserror::Error;

/// Main error type for the solver
#[derive(Error, Debug)]
pub enum SolverError {
    /// Malformed or infeasible problem description (empty job, operation
    /// without eligible machine, non-positive duration, bad file syntax).
    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    /// A chromosome broke the precedence/structure contract at decode time.
    /// Produced only by an operator defect, never by normal operation.
    #[error("Invalid chromosome: {0}")]
    InvalidChromosome(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for solver operations
pub type Result<T> = std::result::Result<T, SolverError>;
