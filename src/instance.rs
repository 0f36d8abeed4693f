//! Module for parsing and representing FJSSP instances.
//!
//! An instance is an ordered list of jobs; each job is an ordered chain of
//! operations, and each operation lists the machines able to process it with
//! the machine-specific processing time. Instances are validated once at
//! construction and are read-only afterwards.
//!
//! The `.fjs` text format (Brandimarte / Barnes / Hurink benchmark sets) is
//! supported through [`FjsspInstance::from_file`] and [`FjsspInstance::parse`].

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use serde::Serialize;

use crate::error::{Result, SolverError};

/// Processing time of an operation on a machine (integer time units)
pub type Duration = u64;

/// Point in schedule time
pub type Time = u64;

/// One eligible machine for an operation together with its processing time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MachineOption {
    /// Machine identifier (0-indexed internally, 1-indexed in files)
    pub machine: usize,
    /// Processing time on that machine
    pub duration: Duration,
}

impl MachineOption {
    pub fn new(machine: usize, duration: Duration) -> Self {
        MachineOption { machine, duration }
    }
}

/// A single operation: the set of machines that can process it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Operation {
    pub options: Vec<MachineOption>,
}

impl Operation {
    pub fn new(options: Vec<MachineOption>) -> Self {
        Operation { options }
    }

    /// Number of eligible machines
    #[inline]
    pub fn num_options(&self) -> usize {
        self.options.len()
    }

    /// Processing time on `machine`, if it is eligible
    pub fn duration_on(&self, machine: usize) -> Option<Duration> {
        self.options.iter()
            .find(|o| o.machine == machine)
            .map(|o| o.duration)
    }

    /// Shortest processing time over all eligible machines
    pub fn min_duration(&self) -> Duration {
        self.options.iter().map(|o| o.duration).min().unwrap_or(0)
    }

    /// Index of the option with the shortest processing time (first on ties)
    pub fn fastest_option(&self) -> usize {
        let mut best = 0;
        for (i, option) in self.options.iter().enumerate() {
            if option.duration < self.options[best].duration {
                best = i;
            }
        }
        best
    }
}

/// A job: operations that must run in the given order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Job {
    pub operations: Vec<Operation>,
}

impl Job {
    pub fn new(operations: Vec<Operation>) -> Self {
        Job { operations }
    }

    #[inline]
    pub fn num_operations(&self) -> usize {
        self.operations.len()
    }
}

/// Location of an operation inside the instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct OperationRef {
    /// Job index (0-indexed)
    pub job: usize,
    /// Position of the operation within its job (0-indexed)
    pub position: usize,
}

/// Represents a complete FJSSP instance
#[derive(Debug, Clone, Serialize)]
pub struct FjsspInstance {
    /// Name of the instance (file stem when parsed from disk)
    pub name: String,
    /// Number of machines
    pub num_machines: usize,
    /// Jobs in input order
    pub jobs: Vec<Job>,
    /// Global operation id -> (job, position)
    #[serde(skip)]
    operation_refs: Vec<OperationRef>,
    /// First global operation id of each job
    #[serde(skip)]
    job_offsets: Vec<usize>,
}

impl FjsspInstance {
    /// Build and validate an instance.
    ///
    /// Fails with [`SolverError::InvalidInstance`] if there are no jobs, a job
    /// has no operation, an operation has no eligible machine, a machine id is
    /// out of range or repeated within one operation, a duration is zero, or
    /// the total processing time does not fit the time range.
    pub fn new(name: impl Into<String>, num_machines: usize, jobs: Vec<Job>) -> Result<Self> {
        let instance = Self::assemble(name.into(), num_machines, jobs);
        instance.validate()?;
        Ok(instance)
    }

    /// Build without validation. Lets tests exercise degenerate data
    /// (zero durations) that the public constructor rejects.
    #[cfg(test)]
    pub(crate) fn new_unchecked(name: &str, num_machines: usize, jobs: Vec<Job>) -> Self {
        Self::assemble(name.to_string(), num_machines, jobs)
    }

    fn assemble(name: String, num_machines: usize, jobs: Vec<Job>) -> Self {
        let mut operation_refs = Vec::new();
        let mut job_offsets = Vec::with_capacity(jobs.len());

        for (j, job) in jobs.iter().enumerate() {
            job_offsets.push(operation_refs.len());
            for position in 0..job.operations.len() {
                operation_refs.push(OperationRef { job: j, position });
            }
        }

        FjsspInstance {
            name,
            num_machines,
            jobs,
            operation_refs,
            job_offsets,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.num_machines == 0 {
            return Err(SolverError::InvalidInstance("instance declares no machine".into()));
        }
        if self.jobs.is_empty() {
            return Err(SolverError::InvalidInstance("instance has no job".into()));
        }

        for (j, job) in self.jobs.iter().enumerate() {
            if job.operations.is_empty() {
                return Err(SolverError::InvalidInstance(format!("job {} has no operation", j + 1)));
            }
            for (o, op) in job.operations.iter().enumerate() {
                if op.options.is_empty() {
                    return Err(SolverError::InvalidInstance(format!(
                        "operation {} of job {} has no eligible machine", o + 1, j + 1
                    )));
                }
                let mut seen = HashSet::new();
                for option in &op.options {
                    if option.machine >= self.num_machines {
                        return Err(SolverError::InvalidInstance(format!(
                            "operation {} of job {} references machine {} but the instance has {} machines",
                            o + 1, j + 1, option.machine + 1, self.num_machines
                        )));
                    }
                    if !seen.insert(option.machine) {
                        return Err(SolverError::InvalidInstance(format!(
                            "operation {} of job {} lists machine {} twice",
                            o + 1, j + 1, option.machine + 1
                        )));
                    }
                    if option.duration == 0 {
                        return Err(SolverError::InvalidInstance(format!(
                            "operation {} of job {} has non-positive duration on machine {}",
                            o + 1, j + 1, option.machine + 1
                        )));
                    }
                }
            }
        }

        // Bounds every start and end time any decoder can produce, and the
        // idle time summed over all machines.
        let horizon = self.jobs.iter()
            .flat_map(|job| job.operations.iter())
            .map(|op| op.options.iter().map(|o| o.duration).max().unwrap_or(0))
            .try_fold(0u64, |total, d| total.checked_add(d))
            .and_then(|total| total.checked_mul(self.num_machines as u64));
        if horizon.is_none() {
            return Err(SolverError::InvalidInstance(
                "total processing time overflows the time range".into(),
            ));
        }

        Ok(())
    }

    /// Parse an instance from a `.fjs` file. The instance name is the file stem.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let name = path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Self::parse(name, &text)
    }

    /// Parse the `.fjs` text format.
    ///
    /// First line: `<jobs> <machines> [avg machines per operation]`.
    /// Then one line per job: `<ops>` followed, for each operation, by `<k>`
    /// and `k` pairs `<machine> <duration>` with 1-indexed machines.
    pub fn parse(name: impl Into<String>, text: &str) -> Result<Self> {
        let mut lines = text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let header = lines.next()
            .ok_or_else(|| SolverError::InvalidInstance("empty instance file".into()))?;
        let header_values: Vec<&str> = header.split_whitespace().collect();
        if header_values.len() < 2 {
            return Err(SolverError::InvalidInstance(
                "header must contain the number of jobs and machines".into(),
            ));
        }
        let num_jobs: usize = parse_token(header_values[0], "job count")?;
        let num_machines: usize = parse_token(header_values[1], "machine count")?;

        let mut jobs = Vec::new();

        for j in 0..num_jobs {
            let line = lines.next().ok_or_else(|| SolverError::InvalidInstance(format!(
                "expected {} job lines, found {}", num_jobs, j
            )))?;
            let values = line.split_whitespace()
                .map(|t| parse_token::<u64>(t, "job line value"))
                .collect::<Result<Vec<u64>>>()?;

            let mut cursor = values.iter().copied();
            let mut next = |what: &str| -> Result<u64> {
                cursor.next().ok_or_else(|| SolverError::InvalidInstance(format!(
                    "job {}: line ended while reading {}", j + 1, what
                )))
            };
            let mut remaining = values.len();

            let num_ops = next("operation count")?;
            remaining -= 1;
            // each operation needs at least its option count
            if num_ops > remaining as u64 {
                return Err(SolverError::InvalidInstance(format!(
                    "job {}: declares {} operations but the line has {} values left",
                    j + 1, num_ops, remaining
                )));
            }
            let mut operations = Vec::new();

            for _ in 0..num_ops {
                let k = next("machine option count")?;
                remaining -= 1;
                if k > (remaining / 2) as u64 {
                    return Err(SolverError::InvalidInstance(format!(
                        "job {}: declares {} machine options but the line has {} values left",
                        j + 1, k, remaining
                    )));
                }
                remaining -= 2 * k as usize;
                let mut options = Vec::new();
                for _ in 0..k {
                    let machine = next("machine id")? as usize;
                    let duration = next("processing time")?;
                    if machine == 0 {
                        return Err(SolverError::InvalidInstance(format!(
                            "job {}: machine ids are 1-indexed, found 0", j + 1
                        )));
                    }
                    options.push(MachineOption::new(machine - 1, duration));
                }
                operations.push(Operation::new(options));
            }

            jobs.push(Job::new(operations));
        }

        Self::new(name, num_machines, jobs)
    }

    /// Number of jobs
    #[inline]
    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Total number of operations over all jobs
    #[inline]
    pub fn num_operations(&self) -> usize {
        self.operation_refs.len()
    }

    /// Global id of the operation at `position` in `job`
    #[inline]
    pub fn operation_id(&self, job: usize, position: usize) -> usize {
        self.job_offsets[job] + position
    }

    /// Location of a global operation id
    #[inline]
    pub fn operation_ref(&self, op_id: usize) -> OperationRef {
        self.operation_refs[op_id]
    }

    /// Operation data for a global operation id
    #[inline]
    pub fn operation(&self, op_id: usize) -> &Operation {
        let r = self.operation_refs[op_id];
        &self.jobs[r.job].operations[r.position]
    }

    /// Global operation ids of `job`, in precedence order
    pub fn job_operation_ids(&self, job: usize) -> std::ops::Range<usize> {
        let start = self.job_offsets[job];
        start..start + self.jobs[job].operations.len()
    }

    /// Lower bound on the makespan: the longest job chain of shortest
    /// durations, or the total shortest work spread evenly over all machines.
    pub fn makespan_lower_bound(&self) -> Time {
        let longest_chain = self.jobs.iter()
            .map(|job| job.operations.iter().map(Operation::min_duration).sum::<Duration>())
            .max()
            .unwrap_or(0);
        let total_work: Duration = self.jobs.iter()
            .flat_map(|job| job.operations.iter())
            .map(Operation::min_duration)
            .sum();
        let machines = self.num_machines.max(1) as u64;
        let balanced = total_work / machines + u64::from(total_work % machines != 0);
        longest_chain.max(balanced)
    }

    /// Get statistics about the instance
    pub fn statistics(&self) -> InstanceStatistics {
        let num_operations = self.num_operations();
        let total_options: usize = self.jobs.iter()
            .flat_map(|job| job.operations.iter())
            .map(Operation::num_options)
            .sum();
        let max_ops_per_job = self.jobs.iter().map(Job::num_operations).max().unwrap_or(0);

        InstanceStatistics {
            name: self.name.clone(),
            num_jobs: self.num_jobs(),
            num_machines: self.num_machines,
            num_operations,
            max_operations_per_job: max_ops_per_job,
            avg_flexibility: total_options as f64 / num_operations.max(1) as f64,
            makespan_lower_bound: self.makespan_lower_bound(),
        }
    }
}

fn parse_token<T: std::str::FromStr>(token: &str, what: &str) -> Result<T> {
    token.parse().map_err(|_| SolverError::InvalidInstance(format!(
        "invalid {}: '{}'", what, token
    )))
}

/// Statistics about an FJSSP instance
#[derive(Debug, Clone, Serialize)]
pub struct InstanceStatistics {
    pub name: String,
    pub num_jobs: usize,
    pub num_machines: usize,
    pub num_operations: usize,
    pub max_operations_per_job: usize,
    /// Average number of eligible machines per operation
    pub avg_flexibility: f64,
    pub makespan_lower_bound: Time,
}

impl std::fmt::Display for InstanceStatistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Instance: {}", self.name)?;
        writeln!(f, "  Jobs: {}", self.num_jobs)?;
        writeln!(f, "  Machines: {}", self.num_machines)?;
        writeln!(f, "  Operations: {} (max {} per job)", self.num_operations, self.max_operations_per_job)?;
        writeln!(f, "  Avg eligible machines per operation: {:.2}", self.avg_flexibility)?;
        writeln!(f, "  Makespan lower bound: {}", self.makespan_lower_bound)
    }
}
