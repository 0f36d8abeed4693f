//! Decoded schedules for FJSSP.
//!
//! A [`Schedule`] is the concrete outcome of decoding a chromosome: for every
//! operation the machine it runs on and its start and end times. Schedules are
//! derived data and are never mutated after decoding.

use serde::{Deserialize, Serialize};

use crate::instance::{FjsspInstance, Time};

/// One operation placed in time on a machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledOperation {
    /// Job index (0-indexed)
    pub job: usize,
    /// Position of the operation within its job
    pub operation: usize,
    /// Machine the operation runs on
    pub machine: usize,
    pub start: Time,
    pub end: Time,
}

impl ScheduledOperation {
    #[inline]
    pub fn duration(&self) -> Time {
        self.end - self.start
    }
}

/// Complete schedule: one entry per operation, indexed by global operation id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub operations: Vec<ScheduledOperation>,
    pub num_machines: usize,
}

impl Schedule {
    pub fn new(operations: Vec<ScheduledOperation>, num_machines: usize) -> Self {
        Schedule { operations, num_machines }
    }

    /// Completion time of the last operation
    pub fn makespan(&self) -> Time {
        self.operations.iter().map(|op| op.end).max().unwrap_or(0)
    }

    /// Operations assigned to `machine`, ordered by start time
    pub fn machine_timeline(&self, machine: usize) -> Vec<ScheduledOperation> {
        let mut timeline: Vec<ScheduledOperation> = self.operations.iter()
            .filter(|op| op.machine == machine)
            .copied()
            .collect();
        timeline.sort_by_key(|op| (op.start, op.end));
        timeline
    }

    /// Total processing time assigned to `machine`
    pub fn machine_busy_time(&self, machine: usize) -> Time {
        self.operations.iter()
            .filter(|op| op.machine == machine)
            .map(ScheduledOperation::duration)
            .sum()
    }

    /// Largest total processing time on a single machine
    pub fn max_machine_workload(&self) -> Time {
        (0..self.num_machines)
            .map(|m| self.machine_busy_time(m))
            .max()
            .unwrap_or(0)
    }

    /// Sum over machines of the time the machine is not processing before
    /// the makespan.
    pub fn total_idle_time(&self) -> Time {
        let makespan = self.makespan();
        (0..self.num_machines)
            .map(|m| makespan.saturating_sub(self.machine_busy_time(m)))
            .sum()
    }

    /// Check the schedule against the instance and return every violated
    /// constraint as a readable message. An empty list means feasible.
    pub fn violations(&self, instance: &FjsspInstance) -> Vec<String> {
        let mut violations = Vec::new();

        if self.operations.len() != instance.num_operations() {
            violations.push(format!(
                "schedule has {} operations, instance has {}",
                self.operations.len(), instance.num_operations()
            ));
            return violations;
        }

        for (op_id, scheduled) in self.operations.iter().enumerate() {
            let r = instance.operation_ref(op_id);
            if scheduled.job != r.job || scheduled.operation != r.position {
                violations.push(format!("entry {} does not describe operation {:?}", op_id, r));
                continue;
            }
            match instance.operation(op_id).duration_on(scheduled.machine) {
                None => violations.push(format!(
                    "J{}O{} runs on ineligible machine {}",
                    r.job + 1, r.position + 1, scheduled.machine + 1
                )),
                Some(d) if scheduled.end < scheduled.start || scheduled.duration() != d => {
                    violations.push(format!(
                        "J{}O{} lasts {} instead of {}",
                        r.job + 1, r.position + 1, scheduled.end.saturating_sub(scheduled.start), d
                    ))
                }
                _ => {}
            }
            if r.position > 0 {
                let previous = &self.operations[op_id - 1];
                if scheduled.start < previous.end {
                    violations.push(format!(
                        "J{}O{} starts at {} before its predecessor ends at {}",
                        r.job + 1, r.position + 1, scheduled.start, previous.end
                    ));
                }
            }
        }

        for machine in 0..self.num_machines {
            let timeline = self.machine_timeline(machine);
            for pair in timeline.windows(2) {
                // Zero-length operations never occupy the machine
                if pair[0].start == pair[0].end || pair[1].start == pair[1].end {
                    continue;
                }
                if pair[1].start < pair[0].end {
                    violations.push(format!(
                        "J{}O{} and J{}O{} overlap on machine {}",
                        pair[0].job + 1, pair[0].operation + 1,
                        pair[1].job + 1, pair[1].operation + 1,
                        machine + 1
                    ));
                }
            }
        }

        violations
    }

    /// Whether the schedule satisfies every machine and precedence constraint
    pub fn is_feasible(&self, instance: &FjsspInstance) -> bool {
        self.violations(instance).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Job, MachineOption, Operation};

    fn two_job_instance() -> FjsspInstance {
        let op = |m: usize, d: u64| Operation::new(vec![MachineOption::new(m, d)]);
        FjsspInstance::new("t", 2, vec![
            Job::new(vec![op(0, 2), op(1, 3)]),
            Job::new(vec![op(1, 1)]),
        ]).unwrap()
    }

    fn entry(job: usize, operation: usize, machine: usize, start: Time, end: Time) -> ScheduledOperation {
        ScheduledOperation { job, operation, machine, start, end }
    }

    #[test]
    fn test_metrics() {
        let schedule = Schedule::new(vec![
            entry(0, 0, 0, 0, 2),
            entry(0, 1, 1, 2, 5),
            entry(1, 0, 1, 0, 1),
        ], 2);

        assert_eq!(schedule.makespan(), 5);
        assert_eq!(schedule.machine_busy_time(1), 4);
        assert_eq!(schedule.max_machine_workload(), 4);
        // machine 0 idle 3, machine 1 idle 1
        assert_eq!(schedule.total_idle_time(), 4);
        assert_eq!(schedule.machine_timeline(1)[0].job, 1);
        assert!(schedule.is_feasible(&two_job_instance()));
    }

    #[test]
    fn test_detects_overlap_and_precedence() {
        let instance = two_job_instance();

        let overlapping = Schedule::new(vec![
            entry(0, 0, 0, 0, 2),
            entry(0, 1, 1, 2, 5),
            entry(1, 0, 1, 3, 4),
        ], 2);
        assert_eq!(overlapping.violations(&instance).len(), 1);

        let early = Schedule::new(vec![
            entry(0, 0, 0, 0, 2),
            entry(0, 1, 1, 1, 4),
            entry(1, 0, 1, 4, 5),
        ], 2);
        let violations = early.violations(&instance);
        assert_eq!(violations.len(), 1);
        assert!(violations[0].contains("predecessor"));
    }

    #[test]
    fn test_detects_wrong_machine() {
        let schedule = Schedule::new(vec![
            entry(0, 0, 1, 0, 2),
            entry(0, 1, 1, 2, 5),
            entry(1, 0, 1, 5, 6),
        ], 2);
        assert!(!schedule.is_feasible(&two_job_instance()));
    }
}
