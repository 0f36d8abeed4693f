//! Benchmarking and experimentation module for FJSSP.
//!
//! Runs seeded trials of each RL variant, collects statistics and
//! compares the variants' performance.

use crate::error::Result;
use crate::genetic::{AdaptiveGeneticAlgorithm, GAConfig};
use crate::instance::FjsspInstance;
use crate::rl::RlVariant;

use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

/// Result of a single seeded run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrialResult {
    /// Instance name
    pub instance: String,
    /// RL variant label
    pub variant: String,
    /// Seed of the run
    pub seed: u64,
    /// Best makespan found
    pub makespan: u64,
    /// Best objective value found
    pub best_fitness: f64,
    /// Generations executed
    pub generations: usize,
    /// Computation time in seconds
    pub time: f64,
    /// Distinct states in the learned Q-table
    pub q_states: usize,
}

/// Aggregated statistics for one variant on one instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantStatistics {
    pub instance: String,
    pub variant: String,
    pub num_runs: usize,
    pub best_makespan: u64,
    pub mean_makespan: f64,
    pub worst_makespan: u64,
    /// Sample standard deviation (0 for a single run)
    pub std_makespan: f64,
    pub mean_generations: f64,
    pub avg_time: f64,
}

/// Benchmark configuration
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// Number of seeded runs per variant
    pub num_runs: usize,
    /// Configuration shared by every run; run `k` uses seed `base.seed + k`
    pub base: GAConfig,
    /// Variants to compare
    pub variants: Vec<RlVariant>,
    /// Run trials in parallel
    pub parallel: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        BenchmarkConfig {
            num_runs: 5,
            base: GAConfig::default(),
            variants: vec![RlVariant::QLearning, RlVariant::Sarsa],
            parallel: true,
        }
    }
}

impl BenchmarkConfig {
    /// Q-learning, SARSA and SARSA switching to Q-learning halfway
    pub fn all_variants(num_runs: usize, base: GAConfig) -> Self {
        let switch_at = base.max_generations / 2;
        BenchmarkConfig {
            num_runs,
            base,
            variants: vec![
                RlVariant::QLearning,
                RlVariant::Sarsa,
                RlVariant::SarsaThenQLearning { switch_at },
            ],
            parallel: true,
        }
    }
}

/// Benchmarking engine
pub struct Benchmark {
    config: BenchmarkConfig,
    results: Vec<TrialResult>,
}

impl Benchmark {
    pub fn new(config: BenchmarkConfig) -> Self {
        Benchmark {
            config,
            results: Vec::new(),
        }
    }

    /// Number of trials one call to [`Benchmark::run_instance`] performs
    pub fn trials_per_instance(&self) -> usize {
        self.config.num_runs * self.config.variants.len()
    }

    fn run_trial(&self, instance: &FjsspInstance, variant: RlVariant, seed: u64) -> Result<TrialResult> {
        let mut config = self.config.base.clone();
        config.seed = seed;
        config.rl.variant = variant;

        let mut ga = AdaptiveGeneticAlgorithm::new(instance.clone(), config)?;
        let result = ga.run()?;

        Ok(TrialResult {
            instance: instance.name.clone(),
            variant: variant.label().to_string(),
            seed,
            makespan: result.makespan(),
            best_fitness: result.best_fitness.value,
            generations: result.generations,
            time: result.elapsed_seconds,
            q_states: result.q_table.num_states(),
        })
    }

    /// Run every variant `num_runs` times on an instance, calling `on_trial`
    /// as each run completes (possibly from a worker thread)
    pub fn run_instance<F>(&mut self, instance: &FjsspInstance, on_trial: F) -> Result<()>
    where
        F: Fn(&TrialResult) + Sync,
    {
        info!("Running benchmark on instance: {}", instance.name);

        let trials: Vec<(RlVariant, u64)> = self.config.variants.iter()
            .flat_map(|&variant| {
                (0..self.config.num_runs as u64).map(move |run| (variant, run))
            })
            .map(|(variant, run)| (variant, self.config.base.seed.wrapping_add(run)))
            .collect();

        let run = |&(variant, seed): &(RlVariant, u64)| -> Result<TrialResult> {
            let trial = self.run_trial(instance, variant, seed)?;
            on_trial(&trial);
            Ok(trial)
        };

        let results: Result<Vec<TrialResult>> = if self.config.parallel {
            trials.par_iter().map(run).collect()
        } else {
            trials.iter().map(run).collect()
        };

        self.results.extend(results?);
        Ok(())
    }

    /// Compute statistics per (instance, variant)
    pub fn compute_statistics(&self) -> Vec<VariantStatistics> {
        let mut stats_map: HashMap<(String, String), Vec<&TrialResult>> = HashMap::new();

        for result in &self.results {
            stats_map.entry((result.instance.clone(), result.variant.clone()))
                .or_default()
                .push(result);
        }

        let mut statistics = Vec::new();

        for ((instance, variant), results) in stats_map {
            let makespans: Vec<f64> = results.iter().map(|r| r.makespan as f64).collect();
            let times: Vec<f64> = results.iter().map(|r| r.time).collect();
            let generations: Vec<f64> = results.iter().map(|r| r.generations as f64).collect();

            let std_makespan = if makespans.len() < 2 { 0.0 } else { makespans.iter().std_dev() };

            statistics.push(VariantStatistics {
                instance,
                variant,
                num_runs: results.len(),
                best_makespan: results.iter().map(|r| r.makespan).min().unwrap_or(0),
                mean_makespan: makespans.iter().mean(),
                worst_makespan: results.iter().map(|r| r.makespan).max().unwrap_or(0),
                std_makespan,
                mean_generations: generations.iter().mean(),
                avg_time: times.iter().mean(),
            });
        }

        statistics.sort_by(|a, b| {
            a.instance.cmp(&b.instance)
                .then_with(|| a.mean_makespan.total_cmp(&b.mean_makespan))
        });

        statistics
    }

    /// Export results to CSV
    pub fn export_to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for result in &self.results {
            writer.serialize(result)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Export statistics to CSV
    pub fn export_statistics_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = csv::Writer::from_writer(file);

        for stat in self.compute_statistics() {
            writer.serialize(stat)?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Generate summary report
    pub fn generate_report(&self) -> String {
        let mut report = String::new();

        report.push_str("========================================\n");
        report.push_str("     FJSSP RL-GA Benchmark Report\n");
        report.push_str("========================================\n");
        report.push_str(&format!("Generated: {}\n", chrono::Local::now().format("%Y-%m-%d %H:%M:%S")));
        report.push_str(&format!(
            "Runs per variant: {}, population: {}, generations: {}\n\n",
            self.config.num_runs, self.config.base.population_size, self.config.base.max_generations
        ));

        let stats = self.compute_statistics();

        report.push_str("Variant Performance Summary:\n");
        report.push_str("-".repeat(88).as_str());
        report.push('\n');
        report.push_str(&format!("{:<16} {:<24} {:>8} {:>10} {:>8} {:>8} {:>10}\n",
            "Instance", "Variant", "Best", "Mean", "Worst", "Std", "Avg Time"));
        report.push_str("-".repeat(88).as_str());
        report.push('\n');

        for stat in &stats {
            report.push_str(&format!("{:<16} {:<24} {:>8} {:>10.2} {:>8} {:>8.2} {:>10.4}\n",
                stat.instance,
                stat.variant,
                stat.best_makespan,
                stat.mean_makespan,
                stat.worst_makespan,
                stat.std_makespan,
                stat.avg_time));
        }

        report.push_str("-".repeat(88).as_str());
        report.push('\n');

        report.push_str("\nBest Variant per Instance (by mean makespan):\n");

        let mut instance_best: HashMap<&str, &VariantStatistics> = HashMap::new();
        for stat in &stats {
            let entry = instance_best.entry(stat.instance.as_str()).or_insert(stat);
            if stat.mean_makespan < entry.mean_makespan {
                *entry = stat;
            }
        }

        let mut names: Vec<&&str> = instance_best.keys().collect();
        names.sort();
        for name in names {
            let best = instance_best[*name];
            report.push_str(&format!("  {}: {:.2} ({})\n", name, best.mean_makespan, best.variant));
        }

        report
    }

    /// Get all results
    pub fn results(&self) -> &[TrialResult] {
        &self.results
    }
}

/// Load every `.fjs` instance in a directory, sorted by size.
/// Files that fail to parse are skipped with a warning.
pub fn load_instances_from_dir<P: AsRef<Path>>(dir: P) -> Result<Vec<FjsspInstance>> {
    let mut instances = Vec::new();

    for entry in std::fs::read_dir(dir)?.flatten() {
        let path = entry.path();
        if path.extension().map(|e| e == "fjs").unwrap_or(false) {
            match FjsspInstance::from_file(&path) {
                Ok(instance) => instances.push(instance),
                Err(e) => warn!("Skipping {:?}: {}", path, e),
            }
        }
    }

    instances.sort_by(|a, b| {
        a.num_operations().cmp(&b.num_operations()).then_with(|| a.name.cmp(&b.name))
    });

    Ok(instances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn create_test_instance() -> FjsspInstance {
        FjsspInstance::parse("bench", "\
2 2
2  2 1 3 2 4  1 2 2
2  1 1 2  2 1 3 2 1
").unwrap()
    }

    fn small_config(num_runs: usize) -> BenchmarkConfig {
        BenchmarkConfig {
            num_runs,
            base: GAConfig {
                population_size: 10,
                max_generations: 10,
                stagnation_limit: 0,
                seed: 7,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_benchmark_config() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.num_runs, 5);
        assert_eq!(config.variants.len(), 2);

        let all = BenchmarkConfig::all_variants(3, GAConfig::default());
        assert_eq!(all.variants[2], RlVariant::SarsaThenQLearning { switch_at: 100 });
    }

    #[test]
    fn test_run_and_aggregate() {
        let instance = create_test_instance();
        let mut benchmark = Benchmark::new(small_config(3));
        let completed = AtomicUsize::new(0);

        benchmark.run_instance(&instance, |_| {
            completed.fetch_add(1, Ordering::Relaxed);
        }).unwrap();

        assert_eq!(completed.load(Ordering::Relaxed), 6);
        assert_eq!(benchmark.results().len(), benchmark.trials_per_instance());

        let seeds: Vec<u64> = benchmark.results().iter()
            .filter(|r| r.variant == "sarsa")
            .map(|r| r.seed)
            .collect();
        assert_eq!(seeds, vec![7, 8, 9]);

        let stats = benchmark.compute_statistics();
        assert_eq!(stats.len(), 2);
        for stat in &stats {
            assert_eq!(stat.num_runs, 3);
            assert!(stat.best_makespan as f64 <= stat.mean_makespan);
            assert!(stat.mean_makespan <= stat.worst_makespan as f64);
            assert!(stat.std_makespan >= 0.0);
            assert!(stat.best_makespan >= instance.makespan_lower_bound());
        }
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let instance = create_test_instance();

        let mut parallel = Benchmark::new(small_config(2));
        parallel.run_instance(&instance, |_| {}).unwrap();

        let mut sequential = Benchmark::new(BenchmarkConfig { parallel: false, ..small_config(2) });
        sequential.run_instance(&instance, |_| {}).unwrap();

        let makespans = |b: &Benchmark| b.results().iter().map(|r| (r.seed, r.makespan)).collect::<Vec<_>>();
        assert_eq!(makespans(&parallel), makespans(&sequential));
    }

    #[test]
    fn test_single_run_statistics() {
        let mut benchmark = Benchmark::new(small_config(1));
        benchmark.run_instance(&create_test_instance(), |_| {}).unwrap();

        for stat in benchmark.compute_statistics() {
            assert_eq!(stat.std_makespan, 0.0);
            assert_eq!(stat.best_makespan, stat.worst_makespan);
        }
    }

    #[test]
    fn test_report_and_exports() {
        let mut benchmark = Benchmark::new(small_config(2));
        benchmark.run_instance(&create_test_instance(), |_| {}).unwrap();

        let report = benchmark.generate_report();
        assert!(report.contains("q-learning"));
        assert!(report.contains("Best Variant per Instance"));

        let dir = std::env::temp_dir().join(format!("fjssp_bench_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        benchmark.export_to_csv(dir.join("results.csv")).unwrap();
        benchmark.export_statistics_csv(dir.join("statistics.csv")).unwrap();

        let results = std::fs::read_to_string(dir.join("results.csv")).unwrap();
        assert_eq!(results.lines().count(), 5);
        assert!(results.starts_with("instance,variant,seed,makespan"));
        let statistics = std::fs::read_to_string(dir.join("statistics.csv")).unwrap();
        assert_eq!(statistics.lines().count(), 3);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_load_instances_from_dir() {
        let dir = std::env::temp_dir().join(format!("fjssp_load_test_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("b.fjs"), "2 2\n2  2 1 3 2 4  1 2 2\n2  1 1 2  2 1 3 2 1\n").unwrap();
        std::fs::write(dir.join("a.fjs"), "1 1\n1  1 1 5\n").unwrap();
        std::fs::write(dir.join("broken.fjs"), "not an instance").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let instances = load_instances_from_dir(&dir).unwrap();
        std::fs::remove_dir_all(&dir).ok();

        assert_eq!(instances.len(), 2);
        assert_eq!(instances[0].num_operations(), 1);
        assert_eq!(instances[1].num_operations(), 4);
    }
}
