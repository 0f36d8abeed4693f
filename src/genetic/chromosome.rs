//! Two-gene chromosome encoding and the schedule decoders.
//!
//! - `sequence` is an operation-sequence gene: every global operation id
//!   exactly once, in an order compatible with per-job precedence.
//! - `machines` is a machine-choice gene indexed by global operation id; each
//!   value is an index into that operation's list of eligible machines.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::instance::{FjsspInstance, Time};
use crate::schedule::{Schedule, ScheduledOperation};

/// How a chromosome is turned into start times
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeStrategy {
    /// Append each operation after the last operation on its machine
    SemiActive,
    /// Place each operation in the earliest idle gap of its machine that
    /// respects the job's ready time
    Insertion,
}

/// Machine-choice rule used when building the initial population
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MachineInit {
    /// Uniform choice among eligible machines
    Random,
    /// Least cumulative machine load over jobs visited in random order
    GlobalSelection,
    /// Shortest processing time for each operation
    ShortestProcessingTime,
}

/// A candidate solution
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Chromosome {
    pub sequence: Vec<usize>,
    pub machines: Vec<usize>,
}

impl Chromosome {
    pub fn new(sequence: Vec<usize>, machines: Vec<usize>) -> Self {
        Chromosome { sequence, machines }
    }

    /// Random topological order with uniformly random machine choices
    pub fn random<R: Rng + ?Sized>(instance: &FjsspInstance, rng: &mut R) -> Self {
        Self::with_machine_init(instance, MachineInit::Random, rng)
    }

    /// Random topological order with machine choices given by `rule`
    pub fn with_machine_init<R: Rng + ?Sized>(
        instance: &FjsspInstance,
        rule: MachineInit,
        rng: &mut R,
    ) -> Self {
        let sequence = random_sequence(instance, rng);
        let machines = match rule {
            MachineInit::Random => (0..instance.num_operations())
                .map(|op| rng.gen_range(0..instance.operation(op).num_options()))
                .collect(),
            MachineInit::GlobalSelection => global_selection(instance, rng),
            MachineInit::ShortestProcessingTime => (0..instance.num_operations())
                .map(|op| instance.operation(op).fastest_option())
                .collect(),
        };
        Chromosome { sequence, machines }
    }

    /// Machine chosen for global operation `op_id`
    #[inline]
    pub fn machine_of(&self, instance: &FjsspInstance, op_id: usize) -> usize {
        instance.operation(op_id).options[self.machines[op_id]].machine
    }

    /// Check the structural contract against `instance`
    pub fn validate(&self, instance: &FjsspInstance) -> Result<()> {
        let n = instance.num_operations();
        if self.sequence.len() != n || self.machines.len() != n {
            return Err(SolverError::InvalidChromosome(format!(
                "gene lengths {}/{} do not match {} operations",
                self.sequence.len(), self.machines.len(), n
            )));
        }

        let mut next_position = vec![0usize; instance.num_jobs()];
        for &op_id in &self.sequence {
            if op_id >= n {
                return Err(SolverError::InvalidChromosome(format!("unknown operation id {}", op_id)));
            }
            let r = instance.operation_ref(op_id);
            if r.position != next_position[r.job] {
                return Err(SolverError::InvalidChromosome(format!(
                    "J{}O{} appears out of precedence order or more than once",
                    r.job + 1, r.position + 1
                )));
            }
            next_position[r.job] += 1;
        }

        for (op_id, &choice) in self.machines.iter().enumerate() {
            let options = instance.operation(op_id).num_options();
            if choice >= options {
                return Err(SolverError::InvalidChromosome(format!(
                    "machine index {} out of range for operation {} ({} options)",
                    choice, op_id, options
                )));
            }
        }

        Ok(())
    }

    pub fn is_valid(&self, instance: &FjsspInstance) -> bool {
        self.validate(instance).is_ok()
    }

    /// Decode into a schedule. Fails with [`SolverError::InvalidChromosome`]
    /// if the chromosome breaks the structural contract.
    pub fn decode(&self, instance: &FjsspInstance, strategy: DecodeStrategy) -> Result<Schedule> {
        self.validate(instance)?;

        let mut entries: Vec<Option<ScheduledOperation>> = vec![None; instance.num_operations()];
        let mut job_ready: Vec<Time> = vec![0; instance.num_jobs()];
        let mut machine_ready: Vec<Time> = vec![0; instance.num_machines];
        // (start, end) intervals per machine, sorted by start
        let mut busy: Vec<Vec<(Time, Time)>> = vec![Vec::new(); instance.num_machines];

        for &op_id in &self.sequence {
            let r = instance.operation_ref(op_id);
            let option = instance.operation(op_id).options[self.machines[op_id]];
            let m = option.machine;
            let ready = job_ready[r.job];

            let start = match strategy {
                DecodeStrategy::SemiActive => ready.max(machine_ready[m]),
                DecodeStrategy::Insertion => earliest_gap(&busy[m], ready, option.duration),
            };
            let end = start + option.duration;

            if strategy == DecodeStrategy::Insertion {
                let at = busy[m].partition_point(|&(s, _)| s <= start);
                busy[m].insert(at, (start, end));
            }
            machine_ready[m] = machine_ready[m].max(end);
            job_ready[r.job] = end;

            entries[op_id] = Some(ScheduledOperation {
                job: r.job,
                operation: r.position,
                machine: m,
                start,
                end,
            });
        }

        // validate() guarantees every operation appears exactly once
        let operations = entries.into_iter().flatten().collect();
        Ok(Schedule::new(operations, instance.num_machines))
    }
}

/// Earliest start >= `ready` such that `[start, start + duration)` fits
/// between the intervals of `busy`.
fn earliest_gap(busy: &[(Time, Time)], ready: Time, duration: Time) -> Time {
    let mut frontier = 0;
    for &(s, e) in busy {
        let candidate = ready.max(frontier);
        if candidate + duration <= s {
            return candidate;
        }
        frontier = frontier.max(e);
    }
    ready.max(frontier)
}

/// Random topological order: shuffle one token per operation labelled by its
/// job, then give the k-th token of a job that job's k-th operation.
pub fn random_sequence<R: Rng + ?Sized>(instance: &FjsspInstance, rng: &mut R) -> Vec<usize> {
    let mut tokens: Vec<usize> = instance.jobs.iter()
        .enumerate()
        .flat_map(|(j, job)| std::iter::repeat(j).take(job.num_operations()))
        .collect();
    tokens.shuffle(rng);
    sequence_from_jobs(instance, &tokens)
}

/// Map a sequence of job ids to global operation ids in precedence order
pub fn sequence_from_jobs(instance: &FjsspInstance, jobs: &[usize]) -> Vec<usize> {
    let mut next = vec![0usize; instance.num_jobs()];
    jobs.iter()
        .map(|&j| {
            let op = instance.operation_id(j, next[j]);
            next[j] += 1;
            op
        })
        .collect()
}

fn global_selection<R: Rng + ?Sized>(instance: &FjsspInstance, rng: &mut R) -> Vec<usize> {
    let mut choices = vec![0usize; instance.num_operations()];
    let mut load: Vec<Time> = vec![0; instance.num_machines];
    let mut job_order: Vec<usize> = (0..instance.num_jobs()).collect();
    job_order.shuffle(rng);

    for j in job_order {
        for op_id in instance.job_operation_ids(j) {
            let options = &instance.operation(op_id).options;
            let mut best = 0;
            for (i, option) in options.iter().enumerate() {
                let candidate = load[option.machine] + option.duration;
                let current = load[options[best].machine] + options[best].duration;
                if candidate < current {
                    best = i;
                }
            }
            load[options[best].machine] += options[best].duration;
            choices[op_id] = best;
        }
    }

    choices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Job, MachineOption, Operation};
    use rand_chacha::ChaCha8Rng;

    fn sample_instance() -> FjsspInstance {
        FjsspInstance::parse("sample", "\
3 3
3  2 1 3 2 5  1 3 4  2 2 2 3 3
2  1 2 2  3 1 1 2 6 3 2
3  2 1 4 3 1  1 2 3  2 1 2 2 2
").unwrap()
    }

    #[test]
    fn test_random_chromosomes_are_valid() {
        let instance = sample_instance();
        let mut rng = ChaCha8Rng::seed_from_u64(7);

        for rule in [MachineInit::Random, MachineInit::GlobalSelection, MachineInit::ShortestProcessingTime] {
            for _ in 0..50 {
                let chromosome = Chromosome::with_machine_init(&instance, rule, &mut rng);
                assert!(chromosome.is_valid(&instance));
            }
        }
    }

    #[test]
    fn test_decoded_schedules_are_feasible() {
        let instance = sample_instance();
        let mut rng = ChaCha8Rng::seed_from_u64(11);

        for _ in 0..200 {
            let chromosome = Chromosome::random(&instance, &mut rng);
            let active = chromosome.decode(&instance, DecodeStrategy::SemiActive).unwrap();
            let inserted = chromosome.decode(&instance, DecodeStrategy::Insertion).unwrap();

            assert!(active.is_feasible(&instance), "{:?}", active.violations(&instance));
            assert!(inserted.is_feasible(&instance), "{:?}", inserted.violations(&instance));
            assert!(inserted.makespan() <= active.makespan());
        }
    }

    #[test]
    fn test_semi_active_decode_by_hand() {
        let op = |m: usize, d: u64| Operation::new(vec![MachineOption::new(m, d)]);
        let instance = FjsspInstance::new("hand", 2, vec![
            Job::new(vec![op(0, 3), op(1, 2)]),
            Job::new(vec![op(1, 4), op(0, 1)]),
        ]).unwrap();

        // J1O1, J2O1, J1O2, J2O2
        let chromosome = Chromosome::new(vec![0, 2, 1, 3], vec![0; 4]);
        let schedule = chromosome.decode(&instance, DecodeStrategy::SemiActive).unwrap();

        assert_eq!((schedule.operations[0].start, schedule.operations[0].end), (0, 3));
        assert_eq!((schedule.operations[2].start, schedule.operations[2].end), (0, 4));
        assert_eq!((schedule.operations[1].start, schedule.operations[1].end), (4, 6));
        assert_eq!((schedule.operations[3].start, schedule.operations[3].end), (4, 5));
        assert_eq!(schedule.makespan(), 6);
    }

    #[test]
    fn test_insertion_fills_gaps() {
        let op = |m: usize, d: u64| Operation::new(vec![MachineOption::new(m, d)]);
        let instance = FjsspInstance::new("gap", 2, vec![
            Job::new(vec![op(0, 5), op(1, 2)]),
            Job::new(vec![op(1, 3)]),
        ]).unwrap();

        // J1O2 lands at 5 on machine 1; J2O1 then fits in the gap [0, 5)
        let chromosome = Chromosome::new(vec![0, 1, 2], vec![0; 3]);
        let active = chromosome.decode(&instance, DecodeStrategy::SemiActive).unwrap();
        let inserted = chromosome.decode(&instance, DecodeStrategy::Insertion).unwrap();

        assert_eq!(active.operations[2].start, 7);
        assert_eq!(inserted.operations[2].start, 0);
        assert_eq!(inserted.makespan(), 7);
        assert_eq!(active.makespan(), 10);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let instance = sample_instance();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let chromosome = Chromosome::random(&instance, &mut rng);

        let first = chromosome.decode(&instance, DecodeStrategy::SemiActive).unwrap();
        let second = chromosome.decode(&instance, DecodeStrategy::SemiActive).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_rejects_invalid_chromosomes() {
        let instance = sample_instance();
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let valid = Chromosome::random(&instance, &mut rng);

        // J1O2 before J1O1
        let mut swapped = valid.clone();
        let first = swapped.sequence.iter().position(|&op| op == 0).unwrap();
        let second = swapped.sequence.iter().position(|&op| op == 1).unwrap();
        swapped.sequence.swap(first, second);
        assert!(matches!(
            swapped.decode(&instance, DecodeStrategy::SemiActive),
            Err(SolverError::InvalidChromosome(_))
        ));

        let mut short = valid.clone();
        short.sequence.pop();
        assert!(matches!(short.validate(&instance), Err(SolverError::InvalidChromosome(_))));

        let mut duplicated = valid.clone();
        duplicated.sequence[1] = duplicated.sequence[0];
        assert!(duplicated.validate(&instance).is_err());

        let mut bad_machine = valid;
        bad_machine.machines[1] = 5;
        assert!(matches!(
            bad_machine.decode(&instance, DecodeStrategy::Insertion),
            Err(SolverError::InvalidChromosome(_))
        ));
    }

    #[test]
    fn test_zero_durations_decode() {
        let zero = |m: usize| Operation::new(vec![MachineOption::new(m, 0)]);
        let instance = FjsspInstance::new_unchecked("zero", 2, vec![
            Job::new(vec![zero(0), zero(1)]),
            Job::new(vec![zero(1), zero(0)]),
        ]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);

        for strategy in [DecodeStrategy::SemiActive, DecodeStrategy::Insertion] {
            let chromosome = Chromosome::random(&instance, &mut rng);
            let schedule = chromosome.decode(&instance, strategy).unwrap();
            assert_eq!(schedule.makespan(), 0);
            assert!(schedule.is_feasible(&instance));
        }
    }

    #[test]
    fn test_single_job_single_machine() {
        let instance = FjsspInstance::new("one", 1, vec![
            Job::new(vec![
                Operation::new(vec![MachineOption::new(0, 2)]),
                Operation::new(vec![MachineOption::new(0, 3)]),
            ]),
        ]).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let schedule = Chromosome::random(&instance, &mut rng)
            .decode(&instance, DecodeStrategy::Insertion)
            .unwrap();

        assert_eq!(schedule.makespan(), 5);
        assert_eq!(schedule.total_idle_time(), 0);
    }

    #[test]
    fn test_decode_near_time_limit() {
        let long = u64::MAX / 4;
        let instance = FjsspInstance::new("long", 2, vec![
            Job::new(vec![Operation::new(vec![MachineOption::new(0, long)])]),
            Job::new(vec![Operation::new(vec![MachineOption::new(0, long), MachineOption::new(1, 1)])]),
        ]).unwrap();
        let chromosome = Chromosome::new(vec![0, 1], vec![0, 0]);

        for strategy in [DecodeStrategy::SemiActive, DecodeStrategy::Insertion] {
            let schedule = chromosome.decode(&instance, strategy).unwrap();
            assert_eq!(schedule.makespan(), 2 * long);
            assert!(schedule.is_feasible(&instance));
            assert_eq!(schedule.total_idle_time(), 2 * long);
        }
    }

    #[test]
    fn test_global_selection_balances_load() {
        let instance = FjsspInstance::parse("balance", "\
2 2
1  2 1 4 2 4
1  2 1 4 2 4
").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let chromosome = Chromosome::with_machine_init(&instance, MachineInit::GlobalSelection, &mut rng);

        assert_ne!(chromosome.machine_of(&instance, 0), chromosome.machine_of(&instance, 1));
    }
}
