//! Genetic operators on two-gene chromosomes.
//!
//! This module implements:
//! - Selection (tournament, roulette wheel, rank based) with an adjustable
//!   selection pressure
//! - Precedence-preserving crossovers of the sequence gene (POX, JOX)
//! - Two-point and uniform crossover of the machine gene
//! - Precedence-feasible swap and neighbourhood mutation of the sequence gene
//! - Single and half reassignment mutation of the machine gene
//! - Repair of an arbitrary operation permutation into precedence order
//!
//! Every operator returns structurally valid chromosomes when given valid
//! parents, so none of them return `Result`.

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::fitness::Fitness;
use crate::instance::FjsspInstance;
use super::chromosome::Chromosome;

/// Selection method types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SelectionType {
    /// Tournament selection; pressure is the tournament size
    Tournament,
    /// Roulette wheel selection; pressure sharpens the fitness weights
    RouletteWheel,
    /// Rank-based selection; pressure sharpens the rank weights
    RankBased,
}

/// Sequence-gene crossover operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceCrossover {
    /// Precedence-operation crossover
    Pox,
    /// Job-based crossover
    Jox,
}

/// Machine-gene crossover operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineCrossover {
    TwoPoint,
    Uniform,
}

/// Sequence-gene mutation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceMutation {
    /// Swap two operations when the swap keeps precedence
    Swap,
    /// Permute three operations, then repair
    Neighborhood,
}

/// Machine-gene mutation operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MachineMutation {
    /// Reassign one operation to a different eligible machine
    Single,
    /// Redraw the machine of a random half of the operations
    Half,
}

// ---------------------------------------------------------------------------
// Selection
// ---------------------------------------------------------------------------

/// Select a parent index. `fitness` must be sorted best first.
pub fn select<R: Rng + ?Sized>(
    selection: SelectionType,
    fitness: &[Fitness],
    pressure: usize,
    rng: &mut R,
) -> usize {
    match selection {
        SelectionType::Tournament => tournament_select(fitness, pressure, rng),
        SelectionType::RouletteWheel => roulette_select(fitness, pressure, rng),
        SelectionType::RankBased => rank_select(fitness, pressure, rng),
    }
}

/// Tournament selection
pub fn tournament_select<R: Rng + ?Sized>(fitness: &[Fitness], size: usize, rng: &mut R) -> usize {
    let mut best_idx = rng.gen_range(0..fitness.len());

    for _ in 1..size.max(1) {
        let idx = rng.gen_range(0..fitness.len());
        if fitness[idx] < fitness[best_idx] {
            best_idx = idx;
        }
    }

    best_idx
}

/// Roulette wheel selection on `(worst - value + 1) ^ (pressure - 1)`
pub fn roulette_select<R: Rng + ?Sized>(fitness: &[Fitness], pressure: usize, rng: &mut R) -> usize {
    let worst = fitness.iter()
        .map(|f| f.value)
        .fold(f64::NEG_INFINITY, f64::max);
    let exponent = pressure.saturating_sub(1).max(1) as i32;

    let adjusted: Vec<f64> = fitness.iter()
        .map(|f| (worst - f.value + 1.0).powi(exponent))
        .collect();

    let total: f64 = adjusted.iter().sum();
    let mut pick = rng.gen::<f64>() * total;

    for (i, &weight) in adjusted.iter().enumerate() {
        pick -= weight;
        if pick <= 0.0 {
            return i;
        }
    }

    fitness.len() - 1
}

/// Rank-based selection on `(n - rank) ^ (pressure - 1)`
pub fn rank_select<R: Rng + ?Sized>(fitness: &[Fitness], pressure: usize, rng: &mut R) -> usize {
    let n = fitness.len();
    let exponent = pressure.saturating_sub(1).max(1) as i32;
    let weights: Vec<f64> = (0..n).map(|rank| ((n - rank) as f64).powi(exponent)).collect();

    let total: f64 = weights.iter().sum();
    let mut pick = rng.gen::<f64>() * total;

    for (rank, &weight) in weights.iter().enumerate() {
        pick -= weight;
        if pick <= 0.0 {
            return rank;
        }
    }

    n - 1
}

// ---------------------------------------------------------------------------
// Crossover
// ---------------------------------------------------------------------------

/// Recombine two parents into two offspring. The sequence gene uses POX or
/// JOX with equal probability; the machine gene uses `machine_crossover`.
pub fn crossover<R: Rng + ?Sized>(
    instance: &FjsspInstance,
    parent1: &Chromosome,
    parent2: &Chromosome,
    machine_crossover: MachineCrossover,
    rng: &mut R,
) -> (Chromosome, Chromosome) {
    let operator = if rng.gen::<bool>() { SequenceCrossover::Pox } else { SequenceCrossover::Jox };
    let (s1, s2) = match operator {
        SequenceCrossover::Pox => pox_crossover(instance, &parent1.sequence, &parent2.sequence, rng),
        SequenceCrossover::Jox => jox_crossover(instance, &parent1.sequence, &parent2.sequence, rng),
    };
    let (m1, m2) = match machine_crossover {
        MachineCrossover::TwoPoint => two_point_crossover(&parent1.machines, &parent2.machines, rng),
        MachineCrossover::Uniform => uniform_crossover(&parent1.machines, &parent2.machines, rng),
    };

    (Chromosome::new(s1, m1), Chromosome::new(s2, m2))
}

/// Random subset of jobs as a membership mask
fn random_job_set<R: Rng + ?Sized>(num_jobs: usize, rng: &mut R) -> Vec<bool> {
    let size = rng.gen_range(0..=num_jobs);
    let mut mask = vec![false; num_jobs];
    for j in (0..num_jobs).choose_multiple(rng, size) {
        mask[j] = true;
    }
    mask
}

/// Keep the operations of jobs in `keep` at their positions in `keeper` and
/// fill the remaining positions with the other jobs' operations in the
/// order they appear in `donor`.
fn keep_and_fill(instance: &FjsspInstance, keeper: &[usize], donor: &[usize], keep: &[bool]) -> Vec<usize> {
    let mut fill = donor.iter()
        .copied()
        .filter(|&op| !keep[instance.operation_ref(op).job]);

    keeper.iter()
        .map(|&op| {
            if keep[instance.operation_ref(op).job] {
                op
            } else {
                // keeper and donor hold the same operations of the other jobs
                fill.next().unwrap_or(op)
            }
        })
        .collect()
}

/// Precedence-operation crossover. Both children keep the positions of a
/// random job set from their first parent and take the other jobs' order
/// from the other parent.
pub fn pox_crossover<R: Rng + ?Sized>(
    instance: &FjsspInstance,
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let jobs = random_job_set(instance.num_jobs(), rng);
    (
        keep_and_fill(instance, parent1, parent2, &jobs),
        keep_and_fill(instance, parent2, parent1, &jobs),
    )
}

/// Job-based crossover. The job set is split in two: the first child keeps
/// the first set from parent 1, the second child keeps the complement from
/// parent 2.
pub fn jox_crossover<R: Rng + ?Sized>(
    instance: &FjsspInstance,
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let first = random_job_set(instance.num_jobs(), rng);
    let second: Vec<bool> = first.iter().map(|&b| !b).collect();
    (
        keep_and_fill(instance, parent1, parent2, &first),
        keep_and_fill(instance, parent2, parent1, &second),
    )
}

/// Two-point crossover of the machine gene
pub fn two_point_crossover<R: Rng + ?Sized>(
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let n = parent1.len();
    let mut child1 = parent1.to_vec();
    let mut child2 = parent2.to_vec();
    if n < 2 {
        return (child1, child2);
    }

    let mut a = rng.gen_range(0..n);
    let mut b = rng.gen_range(0..n);
    if a > b {
        std::mem::swap(&mut a, &mut b);
    }
    child1[a..b].copy_from_slice(&parent2[a..b]);
    child2[a..b].copy_from_slice(&parent1[a..b]);

    (child1, child2)
}

/// Uniform crossover of the machine gene
pub fn uniform_crossover<R: Rng + ?Sized>(
    parent1: &[usize],
    parent2: &[usize],
    rng: &mut R,
) -> (Vec<usize>, Vec<usize>) {
    let mut child1 = parent1.to_vec();
    let mut child2 = parent2.to_vec();

    for i in 0..parent1.len() {
        if rng.gen::<bool>() {
            child1[i] = parent2[i];
            child2[i] = parent1[i];
        }
    }

    (child1, child2)
}

// ---------------------------------------------------------------------------
// Mutation
// ---------------------------------------------------------------------------

/// Mutate both genes in place: the sequence gene by swap or neighbourhood
/// mutation with equal probability, the machine gene by `machine_mutation`.
pub fn mutate<R: Rng + ?Sized>(
    instance: &FjsspInstance,
    chromosome: &mut Chromosome,
    machine_mutation: MachineMutation,
    rng: &mut R,
) {
    let operator = if rng.gen::<bool>() { SequenceMutation::Swap } else { SequenceMutation::Neighborhood };
    match operator {
        SequenceMutation::Swap => {
            swap_mutation(instance, &mut chromosome.sequence, rng);
        }
        SequenceMutation::Neighborhood => neighborhood_mutation(instance, &mut chromosome.sequence, rng),
    }
    match machine_mutation {
        MachineMutation::Single => single_machine_mutation(instance, &mut chromosome.machines, rng),
        MachineMutation::Half => half_machine_mutation(instance, &mut chromosome.machines, rng),
    }
}

/// Whether swapping positions `i < j` keeps per-job precedence: the two
/// operations belong to different jobs and no operation of either job lies
/// strictly between them.
pub fn is_swap_feasible(instance: &FjsspInstance, sequence: &[usize], i: usize, j: usize) -> bool {
    let (i, j) = if i < j { (i, j) } else { (j, i) };
    if i == j {
        return false;
    }
    let job_a = instance.operation_ref(sequence[i]).job;
    let job_b = instance.operation_ref(sequence[j]).job;
    if job_a == job_b {
        return false;
    }
    sequence[i + 1..j].iter().all(|&op| {
        let job = instance.operation_ref(op).job;
        job != job_a && job != job_b
    })
}

/// Positions `j` that position `i` can be swapped with
fn swap_partners(instance: &FjsspInstance, sequence: &[usize], i: usize) -> Vec<usize> {
    let job_a = instance.operation_ref(sequence[i]).job;
    let mut partners = Vec::new();

    let mut scan = |range: &mut dyn Iterator<Item = usize>| {
        let mut between = vec![false; instance.num_jobs()];
        for j in range {
            let job_b = instance.operation_ref(sequence[j]).job;
            if job_b == job_a {
                break;
            }
            if !between[job_b] {
                partners.push(j);
            }
            between[job_b] = true;
        }
    };
    scan(&mut (i + 1..sequence.len()));
    scan(&mut (0..i).rev());

    partners
}

/// Swap two operations if the swap keeps precedence. Returns false only when
/// no feasible swap exists (a single job, for instance).
pub fn swap_mutation<R: Rng + ?Sized>(instance: &FjsspInstance, sequence: &mut [usize], rng: &mut R) -> bool {
    let mut starts: Vec<usize> = (0..sequence.len()).collect();
    starts.shuffle(rng);

    for i in starts {
        let partners = swap_partners(instance, sequence, i);
        if let Some(&j) = partners.choose(rng) {
            debug_assert!(is_swap_feasible(instance, sequence, i, j));
            sequence.swap(i, j);
            return true;
        }
    }

    false
}

/// Randomly permute the operations at three distinct positions, then repair
pub fn neighborhood_mutation<R: Rng + ?Sized>(instance: &FjsspInstance, sequence: &mut [usize], rng: &mut R) {
    let n = sequence.len();
    if n < 3 {
        return;
    }

    let mut positions: Vec<usize> = (0..n).choose_multiple(rng, 3);
    positions.sort_unstable();
    let mut values: Vec<usize> = positions.iter().map(|&p| sequence[p]).collect();
    values.shuffle(rng);
    for (&p, &v) in positions.iter().zip(values.iter()) {
        sequence[p] = v;
    }

    repair(instance, sequence);
}

/// Reassign one operation with at least two eligible machines to another one
pub fn single_machine_mutation<R: Rng + ?Sized>(instance: &FjsspInstance, machines: &mut [usize], rng: &mut R) {
    let flexible: Vec<usize> = (0..machines.len())
        .filter(|&op| instance.operation(op).num_options() > 1)
        .collect();

    if let Some(&op) = flexible.choose(rng) {
        let options = instance.operation(op).num_options();
        let offset = rng.gen_range(1..options);
        machines[op] = (machines[op] + offset) % options;
    }
}

/// Redraw the machine choice of a random half of the operations
pub fn half_machine_mutation<R: Rng + ?Sized>(instance: &FjsspInstance, machines: &mut [usize], rng: &mut R) {
    let n = machines.len();
    for op in (0..n).choose_multiple(rng, n / 2) {
        machines[op] = rng.gen_range(0..instance.operation(op).num_options());
    }
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Restore precedence order in a permutation of the operation ids: each job
/// keeps the positions its operations occupy, and those positions receive
/// the job's operations in increasing order.
pub fn repair(instance: &FjsspInstance, sequence: &mut [usize]) {
    let mut next = vec![0usize; instance.num_jobs()];
    for slot in sequence.iter_mut() {
        let job = instance.operation_ref(*slot).job;
        *slot = instance.operation_id(job, next[job]);
        next[job] += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::chromosome::random_sequence;
    use rand_chacha::ChaCha8Rng;

    fn instance() -> FjsspInstance {
        FjsspInstance::parse("ops", "\
4 3
3  2 1 3 2 5  1 3 4  2 2 2 3 3
2  1 2 2  3 1 1 2 6 3 2
3  2 1 4 3 1  1 2 3  2 1 2 2 2
2  3 1 1 2 1 3 1  2 1 5 3 5
").unwrap()
    }

    fn fitness_of(values: &[f64]) -> Vec<Fitness> {
        values.iter()
            .map(|&value| Fitness { value, makespan: value as u64, secondary: 0.0 })
            .collect()
    }

    #[test]
    fn test_crossovers_keep_validity() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(17);

        for _ in 0..200 {
            let p1 = Chromosome::random(&instance, &mut rng);
            let p2 = Chromosome::random(&instance, &mut rng);
            for machine_crossover in [MachineCrossover::TwoPoint, MachineCrossover::Uniform] {
                let (c1, c2) = crossover(&instance, &p1, &p2, machine_crossover, &mut rng);
                assert!(c1.is_valid(&instance));
                assert!(c2.is_valid(&instance));
            }
        }
    }

    #[test]
    fn test_pox_keeps_selected_job_positions() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let p1 = random_sequence(&instance, &mut rng);
        let p2 = random_sequence(&instance, &mut rng);

        let keep = vec![true, false, true, false];
        let child = keep_and_fill(&instance, &p1, &p2, &keep);

        for (pos, &op) in p1.iter().enumerate() {
            if keep[instance.operation_ref(op).job] {
                assert_eq!(child[pos], op);
            }
        }
        let from_child: Vec<usize> = child.iter().copied()
            .filter(|&op| !keep[instance.operation_ref(op).job])
            .collect();
        let from_p2: Vec<usize> = p2.iter().copied()
            .filter(|&op| !keep[instance.operation_ref(op).job])
            .collect();
        assert_eq!(from_child, from_p2);
    }

    #[test]
    fn test_mutations_keep_validity() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(23);

        for _ in 0..300 {
            let mut chromosome = Chromosome::random(&instance, &mut rng);
            for machine_mutation in [MachineMutation::Single, MachineMutation::Half] {
                mutate(&instance, &mut chromosome, machine_mutation, &mut rng);
                assert!(chromosome.is_valid(&instance));
            }
        }
    }

    #[test]
    fn test_swap_feasibility_rule() {
        let instance = instance();
        // J1O1 J2O1 J1O2 ...
        let sequence = vec![0, 3, 1, 5, 2, 4, 6, 7, 8, 9];

        // J1O1 <-> J2O1: adjacent, different jobs
        assert!(is_swap_feasible(&instance, &sequence, 0, 1));
        // J1O1 <-> J1O2: same job
        assert!(!is_swap_feasible(&instance, &sequence, 0, 2));
        // J1O1 <-> J3O1 with J1O2 between them
        assert!(!is_swap_feasible(&instance, &sequence, 0, 3));
        assert!(!is_swap_feasible(&instance, &sequence, 4, 4));
    }

    #[test]
    fn test_swap_mutation_changes_sequence() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        let original = random_sequence(&instance, &mut rng);
        let mut sequence = original.clone();

        assert!(swap_mutation(&instance, &mut sequence, &mut rng));
        assert_ne!(sequence, original);
    }

    #[test]
    fn test_single_machine_mutation_changes_one_choice() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(8);
        let original = Chromosome::random(&instance, &mut rng).machines;
        let mut machines = original.clone();

        single_machine_mutation(&instance, &mut machines, &mut rng);
        let changed = machines.iter().zip(&original).filter(|(a, b)| a != b).count();
        assert_eq!(changed, 1);
    }

    #[test]
    fn test_repair_restores_order() {
        let instance = instance();
        let mut rng = ChaCha8Rng::seed_from_u64(31);

        for _ in 0..50 {
            let mut sequence: Vec<usize> = (0..instance.num_operations()).collect();
            sequence.shuffle(&mut rng);
            let jobs_before: Vec<usize> = sequence.iter().map(|&op| instance.operation_ref(op).job).collect();

            repair(&instance, &mut sequence);

            let chromosome = Chromosome::new(sequence.clone(), vec![0; instance.num_operations()]);
            assert!(chromosome.is_valid(&instance));
            let jobs_after: Vec<usize> = sequence.iter().map(|&op| instance.operation_ref(op).job).collect();
            assert_eq!(jobs_before, jobs_after);
        }

        let mut ordered = random_sequence(&instance, &mut rng);
        let expected = ordered.clone();
        repair(&instance, &mut ordered);
        assert_eq!(ordered, expected);
    }

    #[test]
    fn test_selection_prefers_fitter() {
        let fitness = fitness_of(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(12);

        for selection in [SelectionType::Tournament, SelectionType::RouletteWheel, SelectionType::RankBased] {
            let mut counts = [0usize; 5];
            for _ in 0..2000 {
                counts[select(selection, &fitness, 4, &mut rng)] += 1;
            }
            assert!(counts[0] > counts[4], "{:?}: {:?}", selection, counts);
        }
    }

    #[test]
    fn test_higher_pressure_is_greedier() {
        let fitness = fitness_of(&[10.0, 20.0, 30.0, 40.0, 50.0]);
        let mut rng = ChaCha8Rng::seed_from_u64(13);

        let mut best_low = 0;
        let mut best_high = 0;
        for _ in 0..2000 {
            if tournament_select(&fitness, 2, &mut rng) == 0 {
                best_low += 1;
            }
            if tournament_select(&fitness, 6, &mut rng) == 0 {
                best_high += 1;
            }
        }
        assert!(best_high > best_low);
    }
}
