//! FJSSP RL Solver - Command Line Interface
//!
//! Solves Flexible Job Shop Scheduling instances with a genetic algorithm
//! whose operator parameters are adapted by Q-learning or SARSA.

use clap::{Parser, Subcommand, ValueEnum};
use fjssp_rl_solver::benchmark::{load_instances_from_dir, Benchmark, BenchmarkConfig};
use fjssp_rl_solver::genetic::{AdaptiveGeneticAlgorithm, DecodeStrategy, GAConfig};
use fjssp_rl_solver::instance::FjsspInstance;
use fjssp_rl_solver::rl::{QTable, RlVariant};
use fjssp_rl_solver::visualization::Visualizer;

use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "fjssp-rl-solver")]
#[command(author = "M2 AI2D Student")]
#[command(version = "1.0")]
#[command(about = "Flexible Job Shop Scheduling with a self-learning genetic algorithm")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve one instance
    Solve {
        /// Path to the .fjs instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// JSON configuration file (flags below override it)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Learning rule
        #[arg(long, value_enum)]
        variant: Option<Variant>,

        /// Generation at which sarsa-then-q-learning switches (default: half the generations)
        #[arg(long)]
        switch_at: Option<usize>,

        /// Population size
        #[arg(short, long)]
        population: Option<usize>,

        /// Maximum number of generations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Generations without improvement before stopping (0 disables)
        #[arg(long)]
        stagnation: Option<usize>,

        /// Random seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Schedule decoder
        #[arg(long, value_enum)]
        decoder: Option<Decoder>,

        /// Output directory
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Generate SVG Gantt charts and history plots
        #[arg(long)]
        visualize: bool,

        /// Save the learned Q-table as JSON
        #[arg(long)]
        save_q_table: bool,

        /// Start from a previously saved Q-table
        #[arg(long)]
        load_q_table: Option<PathBuf>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Compare the RL variants on an instance
    Compare {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,

        /// Number of seeded runs per variant
        #[arg(short, long, default_value = "10")]
        runs: usize,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of generations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Output CSV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Run benchmarks on a directory of instances
    Benchmark {
        /// Directory containing .fjs files
        #[arg(short, long)]
        dir: PathBuf,

        /// Output directory for results
        #[arg(short, long, default_value = "results")]
        output: PathBuf,

        /// Number of runs per variant
        #[arg(short, long, default_value = "5")]
        runs: usize,

        /// JSON configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of generations
        #[arg(short, long)]
        generations: Option<usize>,

        /// Maximum number of operations per instance
        #[arg(long)]
        max_size: Option<usize>,
    },

    /// Analyze an instance
    Analyze {
        /// Path to the instance file
        #[arg(short, long)]
        instance: PathBuf,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Variant {
    /// Off-policy Q-learning
    QLearning,
    /// On-policy SARSA
    Sarsa,
    /// SARSA first, Q-learning after --switch-at
    SarsaThenQLearning,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
enum Decoder {
    /// Append each operation after its machine's last one
    SemiActive,
    /// Fill the earliest idle gap that fits
    Insertion,
}

fn main() {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Solve { verbose: true, .. });
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match cli.command {
        Commands::Solve {
            instance, config, variant, switch_at, population, generations, stagnation, seed,
            decoder, output, visualize, save_q_table, load_q_table, verbose,
        } => {
            let mut ga_config = load_config(config.as_deref());
            if let Some(p) = population { ga_config.population_size = p; }
            if let Some(g) = generations { ga_config.max_generations = g; }
            if let Some(s) = stagnation { ga_config.stagnation_limit = s; }
            if let Some(s) = seed { ga_config.seed = s; }
            if let Some(d) = decoder {
                ga_config.decode_strategy = match d {
                    Decoder::SemiActive => DecodeStrategy::SemiActive,
                    Decoder::Insertion => DecodeStrategy::Insertion,
                };
            }
            if let Some(v) = variant {
                ga_config.rl.variant = match v {
                    Variant::QLearning => RlVariant::QLearning,
                    Variant::Sarsa => RlVariant::Sarsa,
                    Variant::SarsaThenQLearning => RlVariant::SarsaThenQLearning {
                        switch_at: switch_at.unwrap_or(ga_config.max_generations / 2),
                    },
                };
            }

            let options = SolveOptions { output, visualize, save_q_table, load_q_table, verbose };
            solve_instance(&instance, ga_config, &options);
        }

        Commands::Compare { instance, runs, config, generations, output } => {
            let mut ga_config = load_config(config.as_deref());
            if let Some(g) = generations { ga_config.max_generations = g; }
            compare_variants(&instance, runs, ga_config, output);
        }

        Commands::Benchmark { dir, output, runs, config, generations, max_size } => {
            let mut ga_config = load_config(config.as_deref());
            if let Some(g) = generations { ga_config.max_generations = g; }
            run_benchmark(&dir, &output, runs, ga_config, max_size);
        }

        Commands::Analyze { instance } => {
            analyze_instance(&instance);
        }
    }
}

struct SolveOptions {
    output: PathBuf,
    visualize: bool,
    save_q_table: bool,
    load_q_table: Option<PathBuf>,
    verbose: bool,
}

fn load_config(path: Option<&Path>) -> GAConfig {
    match path {
        Some(path) => match GAConfig::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Error loading configuration {:?}: {}", path, e);
                std::process::exit(1);
            }
        },
        None => GAConfig::default(),
    }
}

fn load_instance(path: &Path) -> FjsspInstance {
    match FjsspInstance::from_file(path) {
        Ok(inst) => inst,
        Err(e) => {
            eprintln!("Error loading instance: {}", e);
            std::process::exit(1);
        }
    }
}

fn solve_instance(path: &Path, config: GAConfig, options: &SolveOptions) {
    println!("Loading instance from {:?}...", path);
    let instance = load_instance(path);

    if options.verbose {
        println!("{}", instance.statistics());
        println!("Configuration: {}", serde_json::to_string(&config).unwrap_or_default());
    }

    let variant = config.rl.variant.label();
    let mut ga = match AdaptiveGeneticAlgorithm::new(instance.clone(), config) {
        Ok(ga) => ga,
        Err(e) => {
            eprintln!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    if let Some(q_path) = &options.load_q_table {
        ga = match QTable::load(q_path).and_then(|table| ga.with_q_table(table)) {
            Ok(ga) => ga,
            Err(e) => {
                eprintln!("Error loading Q-table {:?}: {}", q_path, e);
                std::process::exit(1);
            }
        };
        println!("Warm start from Q-table {:?}", q_path);
    }

    println!("Solving with {} ...", variant);
    let result = match ga.run() {
        Ok(result) => result,
        Err(e) => {
            eprintln!("Solver error: {}", e);
            std::process::exit(1);
        }
    };

    println!("\n========== Results ==========");
    print!("{}", result);
    println!("Lower bound: {}", instance.makespan_lower_bound());

    if options.verbose {
        println!("\nOperation sequence: {:?}", result.best_chromosome.sequence);
        for machine in 0..instance.num_machines {
            let timeline: Vec<String> = result.best_schedule.machine_timeline(machine).iter()
                .map(|op| format!("J{}O{}[{}-{}]", op.job + 1, op.operation + 1, op.start, op.end))
                .collect();
            println!("  M{}: {}", machine + 1, timeline.join(" "));
        }

        let rl = ga.controller();
        if let Some(index) = rl.q_table().most_visited_state() {
            let state = rl.config().discretizer.state_at(index);
            let row = rl.q_table().row(index);
            println!(
                "\nMost visited state {} (improvement {}, diversity {}, stagnation {}): {} visits",
                index, state.improvement, state.diversity, state.stagnation, rl.q_table().state_visits(index)
            );
            let greedy = row.iter().enumerate().max_by(|a, b| a.1.total_cmp(b.1));
            if let Some((action, value)) = greedy {
                println!("  greedy action {} = {:.4}", rl.config().action_space.action(action), value);
            }
        }
    }

    let run_dir = options.output.join(format!(
        "{}_{}_{}",
        instance.name, variant, chrono::Local::now().format("%Y%m%d_%H%M%S")
    ));
    if let Err(e) = std::fs::create_dir_all(&run_dir) {
        eprintln!("Failed to create output directory {:?}: {}", run_dir, e);
        std::process::exit(1);
    }

    let mut saved = vec![
        ("solution", run_dir.join("solution.json"), result.save_solution_json(run_dir.join("solution.json"))),
        ("history", run_dir.join("history.csv"), result.save_history_csv(run_dir.join("history.csv"))),
    ];
    if options.save_q_table {
        let q_path = run_dir.join("q_table.json");
        let saved_q = result.q_table.save(&q_path);
        saved.push(("Q-table", q_path, saved_q));
    }
    for (what, path, outcome) in saved {
        match outcome {
            Ok(()) => println!("{} saved to {:?}", what, path),
            Err(e) => eprintln!("Failed to write {} to {:?}: {}", what, path, e),
        }
    }

    if options.visualize {
        let viz = Visualizer::new();
        let charts = [
            ("gantt_initial.svg", viz.generate_gantt_svg(&instance, &result.initial_schedule, "Initial best")),
            ("gantt_final.svg", viz.generate_gantt_svg(&instance, &result.best_schedule, "Final best")),
            ("convergence.svg", viz.generate_convergence_svg(&result.history)),
            ("reward.svg", viz.generate_reward_svg(&result.history)),
            ("parameters.svg", viz.generate_parameter_svg(&result.history)),
        ];
        for (name, svg) in charts {
            let svg_path = run_dir.join(name);
            match viz.save_svg(&svg, &svg_path) {
                Ok(()) => println!("Visualization saved to {:?}", svg_path),
                Err(e) => eprintln!("Failed to save {:?}: {}", svg_path, e),
            }
        }
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style.progress_chars("=>-"));
    pb
}

fn compare_variants(path: &Path, runs: usize, config: GAConfig, output: Option<PathBuf>) {
    let instance = load_instance(path);

    println!("Comparing RL variants on {} ({} jobs, {} machines, {} operations)...\n",
        instance.name, instance.num_jobs(), instance.num_machines, instance.num_operations());

    let mut benchmark = Benchmark::new(BenchmarkConfig::all_variants(runs, config));
    let pb = progress_bar(benchmark.trials_per_instance());
    let outcome = benchmark.run_instance(&instance, |trial| {
        pb.set_message(format!("{} seed {}: {}", trial.variant, trial.seed, trial.makespan));
        pb.inc(1);
    });
    pb.finish_and_clear();

    if let Err(e) = outcome {
        eprintln!("Comparison failed: {}", e);
        std::process::exit(1);
    }

    println!("========== Summary ==========");
    println!("{:<24} {:>10} {:>10} {:>10} {:>10} {:>10}",
        "Variant", "Best", "Average", "Worst", "Std", "Avg Time");
    println!("{}", "-".repeat(80));

    for stat in benchmark.compute_statistics() {
        println!("{:<24} {:>10} {:>10.2} {:>10} {:>10.2} {:>10.4}",
            stat.variant, stat.best_makespan, stat.mean_makespan,
            stat.worst_makespan, stat.std_makespan, stat.avg_time);
    }
    println!("Lower bound: {}", instance.makespan_lower_bound());

    if let Some(out_path) = output {
        match benchmark.export_to_csv(&out_path) {
            Ok(()) => println!("\nResults exported to {:?}", out_path),
            Err(e) => eprintln!("Failed to write CSV: {}", e),
        }
    }
}

fn run_benchmark(dir: &Path, output: &Path, runs: usize, config: GAConfig, max_size: Option<usize>) {
    println!("Loading instances from {:?}...", dir);

    let mut instances = match load_instances_from_dir(dir) {
        Ok(instances) => instances,
        Err(e) => {
            eprintln!("Error reading {:?}: {}", dir, e);
            std::process::exit(1);
        }
    };

    if let Some(max) = max_size {
        instances.retain(|i| i.num_operations() <= max);
    }

    println!("Found {} instances", instances.len());

    if instances.is_empty() {
        eprintln!("No instances found!");
        return;
    }

    if let Err(e) = std::fs::create_dir_all(output) {
        eprintln!("Failed to create output directory: {}", e);
        std::process::exit(1);
    }

    let mut benchmark = Benchmark::new(BenchmarkConfig::all_variants(runs, config));
    let pb = progress_bar(benchmark.trials_per_instance() * instances.len());

    for instance in &instances {
        pb.set_message(instance.name.clone());
        let outcome = benchmark.run_instance(instance, |_| pb.inc(1));
        if let Err(e) = outcome {
            pb.abandon();
            eprintln!("Benchmark failed on {}: {}", instance.name, e);
            std::process::exit(1);
        }
    }
    pb.finish_with_message("done");

    let results_path = output.join("results.csv");
    match benchmark.export_to_csv(&results_path) {
        Ok(()) => println!("\nResults exported to {:?}", results_path),
        Err(e) => eprintln!("Failed to export results: {}", e),
    }

    let stats_path = output.join("statistics.csv");
    match benchmark.export_statistics_csv(&stats_path) {
        Ok(()) => println!("Statistics exported to {:?}", stats_path),
        Err(e) => eprintln!("Failed to export statistics: {}", e),
    }

    let report = benchmark.generate_report();
    println!("\n{}", report);

    let report_path = output.join("report.txt");
    match std::fs::write(&report_path, &report) {
        Ok(()) => println!("Report saved to {:?}", report_path),
        Err(e) => eprintln!("Failed to save report: {}", e),
    }
}

fn analyze_instance(path: &Path) {
    let instance = load_instance(path);

    println!("========== Instance Analysis ==========\n");
    println!("{}", instance.statistics());

    let mut workload = vec![0u64; instance.num_machines];
    let mut eligible = vec![0usize; instance.num_machines];
    for job in &instance.jobs {
        for op in &job.operations {
            for option in &op.options {
                eligible[option.machine] += 1;
            }
            let fastest = &op.options[op.fastest_option()];
            workload[fastest.machine] += fastest.duration;
        }
    }

    println!("Machine Statistics:");
    println!("{:<8} {:>10} {:>22}", "Machine", "Eligible", "Fastest-choice load");
    println!("{}", "-".repeat(42));
    for machine in 0..instance.num_machines {
        println!("{:<8} {:>10} {:>22}", format!("M{}", machine + 1), eligible[machine], workload[machine]);
    }

    let job_work: Vec<u64> = instance.jobs.iter()
        .map(|job| job.operations.iter().map(|op| op.min_duration()).sum())
        .collect();
    if let (Some(min), Some(max)) = (job_work.iter().min(), job_work.iter().max()) {
        println!("\nJob Statistics (shortest processing time per job):");
        println!("  Average: {:.2}", job_work.iter().sum::<u64>() as f64 / job_work.len() as f64);
        println!("  Min: {}", min);
        println!("  Max: {}", max);
    }
}
