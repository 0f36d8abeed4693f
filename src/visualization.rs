//! Visualization utilities for FJSSP runs.
//!
//! Generates SVG Gantt charts of schedules and line plots of a run's
//! history (convergence, controller reward, adapted parameters).

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::genetic::GenerationRecord;
use crate::instance::FjsspInstance;
use crate::schedule::Schedule;

const JOB_COLORS: [&str; 12] = [
    "#3498db", "#e74c3c", "#2ecc71", "#f39c12", "#9b59b6", "#1abc9c",
    "#e67e22", "#34495e", "#16a085", "#c0392b", "#8e44ad", "#27ae60",
];

/// One line of a line chart
struct Series<'a> {
    name: &'a str,
    color: &'a str,
    values: Vec<f64>,
}

/// SVG visualization generator
pub struct Visualizer {
    /// Canvas width
    pub width: f64,
    /// Canvas height of line charts
    pub height: f64,
    /// Margin
    pub margin: f64,
    /// Height of one machine row in Gantt charts
    pub row_height: f64,
}

impl Default for Visualizer {
    fn default() -> Self {
        Visualizer {
            width: 1000.0,
            height: 400.0,
            margin: 60.0,
            row_height: 30.0,
        }
    }
}

/// Escape the characters XML gives meaning to in text content
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn header(width: f64, height: f64) -> String {
    format!(
        r##"<?xml version="1.0" encoding="UTF-8"?>
<svg xmlns="http://www.w3.org/2000/svg" width="{}" height="{}" viewBox="0 0 {} {}">
<style>
    .axis {{ stroke: #2c3e50; stroke-width: 1; }}
    .grid {{ stroke: #bdc3c7; stroke-width: 0.5; stroke-dasharray: 3,3; }}
    .label {{ font-family: Arial; font-size: 11px; fill: #2c3e50; }}
    .op {{ font-family: Arial; font-size: 9px; fill: #ffffff; }}
    .title {{ font-family: Arial; font-size: 14px; fill: #2c3e50; font-weight: bold; }}
</style>
<rect width="100%" height="100%" fill="#ecf0f1"/>
"##,
        width, height, width, height
    )
}

impl Visualizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a Gantt chart: one row per machine, one bar per operation,
    /// coloured by job and labelled `J<job>O<operation>`.
    pub fn generate_gantt_svg(&self, instance: &FjsspInstance, schedule: &Schedule, title: &str) -> String {
        let rows = schedule.num_machines.max(1);
        let height = 2.0 * self.margin + rows as f64 * self.row_height + 40.0;
        let plot_width = self.width - 2.0 * self.margin;
        let makespan = schedule.makespan().max(1) as f64;
        let x_scale = plot_width / makespan;

        let mut svg = header(self.width, height);
        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">{} | {} | Makespan: {}</text>
"##,
            self.margin, escape_xml(title), escape_xml(&instance.name), schedule.makespan()
        ));

        for machine in 0..rows {
            let y = self.margin + machine as f64 * self.row_height;
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="end">M{}</text>
<line x1="{:.2}" y1="{:.2}" x2="{:.2}" y2="{:.2}" class="grid"/>
"##,
                self.margin - 8.0, y + self.row_height * 0.6, machine + 1,
                self.margin, y + self.row_height, self.width - self.margin, y + self.row_height
            ));

            for op in schedule.machine_timeline(machine) {
                let x = self.margin + op.start as f64 * x_scale;
                let w = (op.duration() as f64 * x_scale).max(1.0);
                let color = JOB_COLORS[op.job % JOB_COLORS.len()];
                svg.push_str(&format!(
                    r##"<rect x="{:.2}" y="{:.2}" width="{:.2}" height="{:.2}" fill="{}" stroke="#2c3e50" stroke-width="0.5"><title>J{}O{} [{}, {}]</title></rect>
"##,
                    x, y + 3.0, w, self.row_height - 6.0, color,
                    op.job + 1, op.operation + 1, op.start, op.end
                ));
                if w > 28.0 {
                    svg.push_str(&format!(
                        r##"<text x="{:.2}" y="{:.2}" class="op" text-anchor="middle">J{}O{}</text>
"##,
                        x + w / 2.0, y + self.row_height * 0.6, op.job + 1, op.operation + 1
                    ));
                }
            }
        }

        let axis_y = self.margin + rows as f64 * self.row_height;
        svg.push_str(&format!(
            r##"<line x1="{}" y1="{:.2}" x2="{}" y2="{:.2}" class="axis"/>
"##,
            self.margin, axis_y, self.width - self.margin, axis_y
        ));
        for tick in axis_ticks(makespan) {
            let x = self.margin + tick * x_scale;
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
                x, axis_y + 15.0, tick
            ));
        }

        let legend_y = axis_y + 30.0;
        for job in 0..instance.num_jobs().min(JOB_COLORS.len() * 2) {
            let x = self.margin + job as f64 * 60.0;
            if x + 60.0 > self.width {
                break;
            }
            svg.push_str(&format!(
                r##"<rect x="{:.2}" y="{:.2}" width="12" height="12" fill="{}"/>
<text x="{:.2}" y="{:.2}" class="label">J{}</text>
"##,
                x, legend_y, JOB_COLORS[job % JOB_COLORS.len()], x + 16.0, legend_y + 10.0, job + 1
            ));
        }

        svg.push_str("</svg>");
        svg
    }

    /// Best, global best and mean fitness per generation
    pub fn generate_convergence_svg(&self, history: &[GenerationRecord]) -> String {
        self.line_chart("Convergence", "Fitness", &[
            Series { name: "best", color: "#e74c3c", values: history.iter().map(|r| r.best_fitness).collect() },
            Series { name: "global best", color: "#2c3e50", values: history.iter().map(|r| r.global_best_fitness).collect() },
            Series { name: "mean", color: "#3498db", values: history.iter().map(|r| r.mean_fitness).collect() },
        ])
    }

    /// Controller reward per generation
    pub fn generate_reward_svg(&self, history: &[GenerationRecord]) -> String {
        self.line_chart("Reward", "Reward", &[
            Series { name: "reward", color: "#27ae60", values: history.iter().map(|r| r.reward).collect() },
            Series { name: "epsilon", color: "#95a5a6", values: history.iter().map(|r| r.epsilon).collect() },
        ])
    }

    /// Crossover rate, mutation rate and selection pressure per generation
    pub fn generate_parameter_svg(&self, history: &[GenerationRecord]) -> String {
        let max_pressure = history.iter().map(|r| r.selection_pressure).max().unwrap_or(1).max(1) as f64;
        self.line_chart("Parameter adaptation", "Value", &[
            Series { name: "crossover rate", color: "#9b59b6", values: history.iter().map(|r| r.crossover_rate).collect() },
            Series { name: "mutation rate", color: "#e67e22", values: history.iter().map(|r| r.mutation_rate).collect() },
            Series {
                name: "selection pressure (scaled)",
                color: "#16a085",
                values: history.iter().map(|r| r.selection_pressure as f64 / max_pressure).collect(),
            },
        ])
    }

    fn line_chart(&self, title: &str, y_label: &str, series: &[Series<'_>]) -> String {
        let width = self.width;
        let height = self.height;
        let margin = self.margin;
        let plot_width = width - 2.0 * margin;
        let plot_height = height - 2.0 * margin;

        let points = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
        let finite = || series.iter().flat_map(|s| s.values.iter().copied()).filter(|v| v.is_finite());
        let mut y_min = finite().fold(f64::INFINITY, f64::min);
        let mut y_max = finite().fold(f64::NEG_INFINITY, f64::max);
        if !y_min.is_finite() || !y_max.is_finite() {
            y_min = 0.0;
            y_max = 1.0;
        }
        if (y_max - y_min).abs() < 1e-12 {
            y_min -= 0.5;
            y_max += 0.5;
        }

        let x_scale = plot_width / (points.saturating_sub(1)).max(1) as f64;
        let y_scale = plot_height / (y_max - y_min);
        let to_y = |v: f64| height - margin - (v - y_min) * y_scale;

        let mut svg = header(width, height);
        svg.push_str(&format!(
            r##"<text x="{}" y="25" class="title">{}</text>
<line x1="{}" y1="{}" x2="{}" y2="{}" class="axis"/>
<line x1="{}" y1="{}" x2="{}" y2="{}" class="axis"/>
<text x="{}" y="{}" class="label" text-anchor="middle">Generation</text>
<text x="15" y="{}" class="label" transform="rotate(-90 15 {})" text-anchor="middle">{}</text>
"##,
            margin, escape_xml(title),
            margin, height - margin, width - margin, height - margin,
            margin, margin, margin, height - margin,
            width / 2.0, height - 15.0,
            height / 2.0, height / 2.0, escape_xml(y_label)
        ));

        for (label, value) in [(format!("{:.3}", y_max), y_max), (format!("{:.3}", y_min), y_min)] {
            svg.push_str(&format!(
                r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="end">{}</text>
"##,
                margin - 5.0, to_y(value) + 4.0, label
            ));
        }
        if y_min < 0.0 && y_max > 0.0 {
            svg.push_str(&format!(
                r##"<line x1="{}" y1="{:.2}" x2="{}" y2="{:.2}" class="grid"/>
"##,
                margin, to_y(0.0), width - margin, to_y(0.0)
            ));
        }
        svg.push_str(&format!(
            r##"<text x="{:.2}" y="{:.2}" class="label" text-anchor="middle">{}</text>
"##,
            width - margin, height - margin + 15.0, points.saturating_sub(1)
        ));

        for (k, s) in series.iter().enumerate() {
            let mut path = String::new();
            for (i, &v) in s.values.iter().enumerate() {
                if !v.is_finite() {
                    continue;
                }
                let x = margin + i as f64 * x_scale;
                if path.is_empty() {
                    path.push_str(&format!("M {:.2} {:.2}", x, to_y(v)));
                } else {
                    path.push_str(&format!(" L {:.2} {:.2}", x, to_y(v)));
                }
            }
            svg.push_str(&format!(
                r##"<path d="{}" stroke="{}" stroke-width="2" fill="none"/>
<rect x="{:.2}" y="{:.2}" width="12" height="3" fill="{}"/>
<text x="{:.2}" y="{:.2}" class="label">{}</text>
"##,
                path, s.color,
                width - margin - 170.0, margin + 10.0 + k as f64 * 16.0, s.color,
                width - margin - 152.0, margin + 14.0 + k as f64 * 16.0, escape_xml(s.name)
            ));
        }

        svg.push_str("</svg>");
        svg
    }

    /// Save SVG to file
    pub fn save_svg<P: AsRef<Path>>(&self, svg: &str, path: P) -> std::io::Result<()> {
        let mut file = File::create(path)?;
        file.write_all(svg.as_bytes())?;
        Ok(())
    }
}

/// Roughly ten round tick positions in `[0, max]`
fn axis_ticks(max: f64) -> Vec<f64> {
    let raw = max / 10.0;
    let magnitude = 10f64.powf(raw.max(1.0).log10().floor());
    let step = [1.0, 2.0, 5.0, 10.0]
        .iter()
        .map(|m| m * magnitude)
        .find(|&s| s >= raw)
        .unwrap_or(magnitude * 10.0)
        .max(1.0);

    let mut ticks = Vec::new();
    let mut t = 0.0;
    while t <= max + 1e-9 {
        ticks.push(t);
        t += step;
    }
    ticks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genetic::{DecodeStrategy, Chromosome};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn create_test_instance() -> FjsspInstance {
        FjsspInstance::parse("viz", "\
2 2
2  2 1 3 2 4  1 2 2
2  1 1 2  2 1 3 2 1
").unwrap()
    }

    fn record(generation: usize, best: f64, reward: f64) -> GenerationRecord {
        GenerationRecord {
            generation,
            best_fitness: best,
            global_best_fitness: best,
            mean_fitness: best + 2.0,
            diversity: 0.1,
            crossover_rate: 0.8,
            mutation_rate: 0.15,
            selection_pressure: 4,
            action: "preset-0".to_string(),
            reward,
            epsilon: 0.3,
            state: 0,
            stagnation: 0,
        }
    }

    #[test]
    fn test_gantt_chart() {
        let instance = create_test_instance();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let schedule = Chromosome::random(&instance, &mut rng)
            .decode(&instance, DecodeStrategy::SemiActive)
            .unwrap();

        let svg = Visualizer::new().generate_gantt_svg(&instance, &schedule, "Final");

        assert!(svg.starts_with("<?xml"));
        assert!(svg.ends_with("</svg>"));
        assert_eq!(svg.matches("<rect x=").count() - 2, instance.num_operations());
        assert!(svg.contains("M2"));
        assert!(svg.contains(&format!("Makespan: {}", schedule.makespan())));
    }

    #[test]
    fn test_text_is_escaped() {
        let instance = FjsspInstance::parse("a&b<c>", "1 1\n1 1 1 3\n").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let schedule = Chromosome::random(&instance, &mut rng)
            .decode(&instance, DecodeStrategy::SemiActive)
            .unwrap();

        let svg = Visualizer::new().generate_gantt_svg(&instance, &schedule, "R&D <final>");
        assert!(svg.contains("R&amp;D &lt;final&gt; | a&amp;b&lt;c&gt; | Makespan: 3"));
        assert!(!svg.contains("a&b<"));
        assert!(!svg.contains("<final>"));
        assert_eq!(escape_xml("x &amp; y"), "x &amp;amp; y");
    }

    #[test]
    fn test_history_plots() {
        let history = vec![record(0, 10.0, 0.0), record(1, 9.0, 0.1), record(2, 9.0, -0.05)];
        let viz = Visualizer::new();

        let convergence = viz.generate_convergence_svg(&history);
        assert!(convergence.contains("Convergence"));
        assert_eq!(convergence.matches("<path").count(), 3);

        let reward = viz.generate_reward_svg(&history);
        assert!(reward.contains("class=\"grid\""));

        let parameters = viz.generate_parameter_svg(&history);
        assert!(parameters.contains("crossover rate"));
    }

    #[test]
    fn test_empty_history() {
        let svg = Visualizer::new().generate_convergence_svg(&[]);
        assert!(svg.ends_with("</svg>"));
    }

    #[test]
    fn test_axis_ticks() {
        assert_eq!(axis_ticks(10.0), vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0]);
        let ticks = axis_ticks(230.0);
        assert_eq!(ticks[1], 50.0);
        assert_eq!(*ticks.last().unwrap(), 200.0);
    }
}
