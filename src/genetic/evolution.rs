//! Self-learning genetic algorithm for FJSSP.
//!
//! The GA evolves two-gene chromosomes. Before each generation the RL
//! controller picks the crossover rate, mutation rate and selection pressure.
//! Once the generation has been evaluated, the controller sees the new state
//! and a reward derived from the change in best fitness, and updates its
//! Q-table.
//!
//! One [`AdaptiveGeneticAlgorithm`] owns everything a run mutates: the
//! population, the Q-table and the random source. Independent runs can
//! therefore execute concurrently.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SolverError};
use crate::fitness::{self, Fitness, ObjectiveWeights};
use crate::instance::FjsspInstance;
use crate::rl::state::relative_improvement;
use crate::rl::{OperatorParameters, PopulationStatistics, QTable, RLConfig, RlController};
use crate::schedule::Schedule;
use super::chromosome::{Chromosome, DecodeStrategy, MachineInit};
use super::operators::{self, MachineCrossover, MachineMutation, SelectionType};

/// Genetic Algorithm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GAConfig {
    /// Population size
    pub population_size: usize,
    /// Number of generations
    pub max_generations: usize,
    /// Generations without a new global best before stopping (0 disables)
    pub stagnation_limit: usize,
    /// Best individuals copied unchanged into the next generation
    pub elite_count: usize,
    /// Selection method
    pub selection_type: SelectionType,
    /// Machine-gene crossover operator
    pub machine_crossover: MachineCrossover,
    /// Machine-gene mutation operator
    pub machine_mutation: MachineMutation,
    /// Decoder used for fitness evaluation
    pub decode_strategy: DecodeStrategy,
    /// Share of the initial population built with load-aware machine choice
    pub heuristic_init_fraction: f64,
    /// Random seed
    pub seed: u64,
    /// Objective weights and tie-break
    pub objective: ObjectiveWeights,
    /// Controller configuration
    pub rl: RLConfig,
}

impl Default for GAConfig {
    fn default() -> Self {
        GAConfig {
            population_size: 100,
            max_generations: 200,
            stagnation_limit: 50,
            elite_count: 1,
            selection_type: SelectionType::Tournament,
            machine_crossover: MachineCrossover::TwoPoint,
            machine_mutation: MachineMutation::Half,
            decode_strategy: DecodeStrategy::SemiActive,
            heuristic_init_fraction: 0.2,
            seed: 42,
            objective: ObjectiveWeights::default(),
            rl: RLConfig::default(),
        }
    }
}

impl GAConfig {
    pub fn validate(&self) -> Result<()> {
        if self.population_size < 2 {
            return Err(SolverError::InvalidConfig("population size must be at least 2".into()));
        }
        if self.elite_count == 0 || self.elite_count >= self.population_size {
            return Err(SolverError::InvalidConfig(format!(
                "elite count {} must be in [1, population size)", self.elite_count
            )));
        }
        if !(0.0..=1.0).contains(&self.heuristic_init_fraction) {
            return Err(SolverError::InvalidConfig(format!(
                "heuristic initialisation fraction {} outside [0, 1]", self.heuristic_init_fraction
            )));
        }
        let weights = [self.objective.makespan, self.objective.idle_time, self.objective.max_workload];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) || weights.iter().all(|&w| w == 0.0) {
            return Err(SolverError::InvalidConfig(
                "objective weights must be finite, non-negative and not all zero".into(),
            ));
        }
        self.rl.validate()
    }

    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let config: GAConfig = serde_json::from_reader(reader)?;
        Ok(config)
    }
}

/// Chromosome with its fitness for the current generation
#[derive(Debug, Clone)]
pub struct Individual {
    pub chromosome: Chromosome,
    pub fitness: Fitness,
}

/// What one generation produced, flat so it can be written as a CSV row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub generation: usize,
    /// Best fitness of this generation's population
    pub best_fitness: f64,
    /// Best fitness seen so far in the run
    pub global_best_fitness: f64,
    pub mean_fitness: f64,
    /// Coefficient of variation of the population's fitness
    pub diversity: f64,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub selection_pressure: usize,
    /// Action whose parameters produced this generation
    pub action: String,
    pub reward: f64,
    pub epsilon: f64,
    /// Discretized state observed after the generation
    pub state: usize,
    pub stagnation: usize,
}

/// What [`AdaptiveGeneticAlgorithm::step`] hands back: the record plus the
/// generation's best individual decoded into a schedule
#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub record: GenerationRecord,
    pub best_schedule: Schedule,
}

/// Outcome of a complete run
#[derive(Debug, Clone, Serialize)]
pub struct OptimizationResult {
    pub instance: String,
    pub variant: String,
    pub best_chromosome: Chromosome,
    pub best_schedule: Schedule,
    pub best_fitness: Fitness,
    /// Best schedule of the initial population
    pub initial_schedule: Schedule,
    pub history: Vec<GenerationRecord>,
    pub generations: usize,
    pub elapsed_seconds: f64,
    pub q_table: QTable,
}

impl OptimizationResult {
    #[inline]
    pub fn makespan(&self) -> u64 {
        self.best_fitness.makespan
    }

    /// Write the per-generation records as CSV
    pub fn save_history_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for record in &self.history {
            writer.serialize(record)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the best solution (chromosome, schedule, fitness) as JSON
    pub fn save_solution_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let solution = serde_json::json!({
            "instance": self.instance,
            "variant": self.variant,
            "makespan": self.best_fitness.makespan,
            "fitness": self.best_fitness,
            "generations": self.generations,
            "elapsed_seconds": self.elapsed_seconds,
            "chromosome": self.best_chromosome,
            "schedule": self.best_schedule,
        });
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &solution)?;
        Ok(())
    }
}

impl fmt::Display for OptimizationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Instance: {} ({})", self.instance, self.variant)?;
        writeln!(f, "  Makespan: {}", self.best_fitness.makespan)?;
        writeln!(f, "  Fitness: {:.3}", self.best_fitness.value)?;
        writeln!(f, "  Initial makespan: {}", self.initial_schedule.makespan())?;
        writeln!(f, "  Generations: {}", self.generations)?;
        writeln!(f, "  Q-table states: {}", self.q_table.num_states())?;
        writeln!(f, "  Time: {:.3}s", self.elapsed_seconds)
    }
}

/// Genetic algorithm whose operator parameters are driven by an RL controller
pub struct AdaptiveGeneticAlgorithm {
    config: GAConfig,
    instance: FjsspInstance,
    population: Vec<Individual>,
    best_individual: Option<Individual>,
    initial_best: Option<Individual>,
    rng: ChaCha8Rng,
    generation: usize,
    no_improve_count: usize,
    controller: RlController,
    state: usize,
    action: usize,
    parameters: OperatorParameters,
    history: Vec<GenerationRecord>,
    cancelled: Arc<AtomicBool>,
    elapsed: Duration,
}

impl AdaptiveGeneticAlgorithm {
    pub fn new(instance: FjsspInstance, config: GAConfig) -> Result<Self> {
        config.validate()?;
        if config.stagnation_limit == 0 {
            warn!("stagnation limit is 0, only the generation limit will stop the run");
        }

        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let parameters = config.rl.action_space.initial_parameters();
        let controller = RlController::new(config.rl.clone());

        Ok(AdaptiveGeneticAlgorithm {
            config,
            instance,
            population: Vec::new(),
            best_individual: None,
            initial_best: None,
            rng,
            generation: 0,
            no_improve_count: 0,
            controller,
            state: 0,
            action: 0,
            parameters,
            history: Vec::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            elapsed: Duration::ZERO,
        })
    }

    /// Start learning from a previously saved Q-table instead of an empty one
    pub fn with_q_table(mut self, q_table: QTable) -> Result<Self> {
        self.controller = RlController::with_q_table(self.config.rl.clone(), q_table)?;
        Ok(self)
    }

    fn evaluate(&self, chromosome: Chromosome) -> Result<Individual> {
        let schedule = chromosome.decode(&self.instance, self.config.decode_strategy)?;
        let fitness = fitness::evaluate(&schedule, &self.config.objective);
        Ok(Individual { chromosome, fitness })
    }

    fn fitness_values(&self) -> Vec<Fitness> {
        self.population.iter().map(|ind| ind.fitness).collect()
    }

    fn label(&self, action: usize) -> String {
        self.config.rl.action_space.action(action).to_string()
    }

    /// Build and evaluate generation 0 and pick the first action at random.
    /// Calling it again after the first time is a no-op.
    pub fn initialize(&mut self) -> Result<GenerationRecord> {
        if let Some(record) = self.history.first() {
            return Ok(record.clone());
        }
        let start = Instant::now();

        let size = self.config.population_size;
        let heuristic = ((size as f64 * self.config.heuristic_init_fraction).round() as usize).min(size);
        let mut chromosomes = Vec::with_capacity(size);
        for i in 0..size {
            let rule = if i >= heuristic {
                MachineInit::Random
            } else if i % 2 == 0 {
                MachineInit::GlobalSelection
            } else {
                MachineInit::ShortestProcessingTime
            };
            chromosomes.push(Chromosome::with_machine_init(&self.instance, rule, &mut self.rng));
        }

        let mut population = Vec::with_capacity(size);
        for chromosome in chromosomes {
            population.push(self.evaluate(chromosome)?);
        }
        population.sort_by_key(|ind| ind.fitness);
        self.population = population;
        self.best_individual = self.population.first().cloned();
        self.initial_best = self.best_individual.clone();

        let stats = PopulationStatistics::from_fitness(&self.fitness_values());
        let discretizer = &self.config.rl.discretizer;
        self.state = discretizer.index(discretizer.discretize(0.0, stats.diversity, 0));
        self.action = self.controller.explore(&mut self.rng);

        let record = GenerationRecord {
            generation: 0,
            best_fitness: stats.best,
            global_best_fitness: stats.best,
            mean_fitness: stats.mean,
            diversity: stats.diversity,
            crossover_rate: self.parameters.crossover_rate,
            mutation_rate: self.parameters.mutation_rate,
            selection_pressure: self.parameters.selection_pressure,
            action: "none".to_string(),
            reward: 0.0,
            epsilon: self.controller.epsilon(),
            state: self.state,
            stagnation: 0,
        };

        let action = self.config.rl.action_space.action(self.action);
        self.parameters = self.config.rl.action_space.apply(action, &self.parameters, &mut self.rng);

        info!(
            "[{}] {} ({} operations): initial best {:.3}, mean {:.3}",
            self.config.rl.variant.label(), self.instance.name, self.instance.num_operations(),
            stats.best, stats.mean
        );

        self.history.push(record.clone());
        self.elapsed += start.elapsed();
        Ok(record)
    }

    /// Produce the next population with the given parameters
    fn breed(&mut self, parameters: &OperatorParameters) -> Result<Vec<Individual>> {
        let size = self.config.population_size;
        let fitness = self.fitness_values();
        let mut next: Vec<Individual> = self.population.iter()
            .take(self.config.elite_count)
            .cloned()
            .collect();

        let mut children = Vec::with_capacity(size);
        {
            let rng = &mut self.rng;
            let instance = &self.instance;
            let population = &self.population;

            while next.len() + children.len() < size {
                let i = operators::select(self.config.selection_type, &fitness, parameters.selection_pressure, rng);
                let j = operators::select(self.config.selection_type, &fitness, parameters.selection_pressure, rng);
                let parent1 = &population[i].chromosome;
                let parent2 = &population[j].chromosome;

                let (child1, child2) = if rng.gen::<f64>() < parameters.crossover_rate {
                    operators::crossover(instance, parent1, parent2, self.config.machine_crossover, rng)
                } else {
                    (parent1.clone(), parent2.clone())
                };

                for mut child in [child1, child2] {
                    if next.len() + children.len() >= size {
                        break;
                    }
                    if rng.gen::<f64>() < parameters.mutation_rate {
                        operators::mutate(instance, &mut child, self.config.machine_mutation, rng);
                    }
                    children.push(child);
                }
            }
        }

        for child in children {
            next.push(self.evaluate(child)?);
        }
        next.sort_by_key(|ind| ind.fitness);
        Ok(next)
    }

    /// Run one generation with the current parameters and let the controller
    /// learn from its outcome. Initializes the run first if needed.
    pub fn step(&mut self) -> Result<GenerationOutcome> {
        if self.history.is_empty() {
            self.initialize()?;
        }
        let start = Instant::now();

        let parameters = self.parameters;
        let previous_best = self.population[0].fitness.value;

        self.population = self.breed(&parameters)?;
        self.generation += 1;

        let generation_best = self.population[0].clone();
        let best_schedule = generation_best.chromosome.decode(&self.instance, self.config.decode_strategy)?;
        let improved = self.best_individual.as_ref()
            .map_or(true, |best| generation_best.fitness < best.fitness);
        if improved {
            info!(
                "[{}] Gen {} new best {:.3} (makespan {})",
                self.config.rl.variant.label(), self.generation,
                generation_best.fitness.value, generation_best.fitness.makespan
            );
            self.best_individual = Some(generation_best.clone());
            self.no_improve_count = 0;
        } else {
            self.no_improve_count += 1;
        }

        let stats = PopulationStatistics::from_fitness(&self.fitness_values());
        let improvement = relative_improvement(previous_best, generation_best.fitness.value);
        let discretizer = &self.config.rl.discretizer;
        let next_state = discretizer.index(discretizer.discretize(improvement, stats.diversity, self.no_improve_count));

        let reward = self.controller.reward(previous_best, generation_best.fitness.value);
        let next_action = self.controller.choose_action(next_state, &mut self.rng);
        self.controller.update(self.state, self.action, reward, next_state, next_action, self.generation);

        let record = GenerationRecord {
            generation: self.generation,
            best_fitness: stats.best,
            global_best_fitness: self.best_fitness().unwrap_or(stats.best),
            mean_fitness: stats.mean,
            diversity: stats.diversity,
            crossover_rate: parameters.crossover_rate,
            mutation_rate: parameters.mutation_rate,
            selection_pressure: parameters.selection_pressure,
            action: self.label(self.action),
            reward,
            epsilon: self.controller.epsilon(),
            state: next_state,
            stagnation: self.no_improve_count,
        };

        debug!(
            "[{}] Gen {} best {:.3} mean {:.3} diversity {:.4} hamming {:.2} action {} reward {:.4} eps {:.3}",
            self.config.rl.variant.label(), record.generation, record.best_fitness, record.mean_fitness,
            record.diversity, self.population_diversity(), record.action, record.reward, record.epsilon
        );

        self.state = next_state;
        self.action = next_action;
        let action = self.config.rl.action_space.action(next_action);
        self.parameters = self.config.rl.action_space.apply(action, &self.parameters, &mut self.rng);
        self.controller.decay_epsilon();

        self.history.push(record.clone());
        self.elapsed += start.elapsed();
        Ok(GenerationOutcome { record, best_schedule })
    }

    /// Whether a termination condition holds
    pub fn is_finished(&self) -> bool {
        self.generation >= self.config.max_generations
            || (self.config.stagnation_limit > 0 && self.no_improve_count >= self.config.stagnation_limit)
            || self.cancelled.load(Ordering::Relaxed)
    }

    /// Handle that stops [`AdaptiveGeneticAlgorithm::run`] at the next
    /// generation boundary when set to true
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    /// Run until a termination condition holds
    pub fn run(&mut self) -> Result<OptimizationResult> {
        if self.history.is_empty() {
            self.initialize()?;
        }

        while !self.is_finished() {
            self.step()?;
        }

        if let Some(best) = &self.best_individual {
            info!(
                "[{}] {} finished after {} generations: best {:.3} (makespan {}) in {:.2}s",
                self.config.rl.variant.label(), self.instance.name, self.generation,
                best.fitness.value, best.fitness.makespan, self.elapsed.as_secs_f64()
            );
        }

        self.result()
    }

    /// Snapshot of the run so far
    pub fn result(&self) -> Result<OptimizationResult> {
        let (best, initial) = match (&self.best_individual, &self.initial_best) {
            (Some(best), Some(initial)) => (best, initial),
            _ => return Err(SolverError::InvalidConfig("the run has not been initialized".into())),
        };

        Ok(OptimizationResult {
            instance: self.instance.name.clone(),
            variant: self.config.rl.variant.label().to_string(),
            best_chromosome: best.chromosome.clone(),
            best_schedule: best.chromosome.decode(&self.instance, self.config.decode_strategy)?,
            best_fitness: best.fitness,
            initial_schedule: initial.chromosome.decode(&self.instance, self.config.decode_strategy)?,
            history: self.history.clone(),
            generations: self.generation,
            elapsed_seconds: self.elapsed.as_secs_f64(),
            q_table: self.controller.q_table().clone(),
        })
    }

    /// Best fitness seen so far
    pub fn best_fitness(&self) -> Option<f64> {
        self.best_individual.as_ref().map(|ind| ind.fitness.value)
    }

    pub fn best_individual(&self) -> Option<&Individual> {
        self.best_individual.as_ref()
    }

    /// Current population, best first
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    pub fn history(&self) -> &[GenerationRecord] {
        &self.history
    }

    /// Get current generation
    pub fn current_generation(&self) -> usize {
        self.generation
    }

    /// Parameters the next generation will use
    pub fn parameters(&self) -> OperatorParameters {
        self.parameters
    }

    pub fn config(&self) -> &GAConfig {
        &self.config
    }

    pub fn controller(&self) -> &RlController {
        &self.controller
    }

    pub fn instance(&self) -> &FjsspInstance {
        &self.instance
    }

    /// Get population diversity (average sequence-gene Hamming distance over
    /// the 20 best individuals)
    pub fn population_diversity(&self) -> f64 {
        if self.population.len() < 2 {
            return 0.0;
        }

        let mut total_diff = 0.0;
        let mut count = 0;

        for i in 0..self.population.len().min(20) {
            for j in i + 1..self.population.len().min(20) {
                let diff = self.population[i].chromosome.sequence.iter()
                    .zip(self.population[j].chromosome.sequence.iter())
                    .filter(|(a, b)| a != b)
                    .count();
                total_diff += diff as f64;
                count += 1;
            }
        }

        if count > 0 {
            total_diff / count as f64
        } else {
            0.0
        }
    }
}
