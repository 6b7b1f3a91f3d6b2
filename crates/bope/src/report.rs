//! Aggregation of experiment logs into best-utility curves.
use crate::results::ExperimentLog;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write;

/// Display style of a subspace method
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MethodStyle {
    /// Legend label
    pub label: String,
    /// Plot color
    pub color: String,
    /// Horizontal offset applied to the number of comparisons
    pub jitter: f64,
}

impl MethodStyle {
    /// Constructor
    pub fn new(label: &str, color: &str, jitter: f64) -> Self {
        MethodStyle {
            label: label.to_string(),
            color: color.to_string(),
            jitter,
        }
    }
}

/// Labels, colors and line styles used to report methods and strategies
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Styles by method name
    pub methods: BTreeMap<String, MethodStyle>,
    /// Line styles by strategy name
    pub strategies: BTreeMap<String, String>,
}

impl Default for ReportConfig {
    fn default() -> Self {
        let methods = [
            ("st", MethodStyle::new("Indep", "tab:blue", 0.)),
            ("pca", MethodStyle::new("PCA", "tab:red", 0.1)),
            ("pcr", MethodStyle::new("PCR", "tab:cyan", 0.05)),
            ("true_proj", MethodStyle::new("True-proj", "tab:pink", 0.)),
            (
                "random_linear_proj",
                MethodStyle::new("Rand-linear-proj", "tab:green", 0.2),
            ),
            (
                "random_subset",
                MethodStyle::new("Rand-subset", "tab:orange", 0.3),
            ),
            ("autoencoder", MethodStyle::new("AE", "tab:purple", 0.15)),
        ]
        .into_iter()
        .map(|(name, style)| (name.to_string(), style))
        .collect();
        let strategies = [("EUBO-zeta", "-"), ("Random-f", "--")]
            .into_iter()
            .map(|(name, line)| (name.to_string(), line.to_string()))
            .collect();
        ReportConfig {
            methods,
            strategies,
        }
    }
}

impl ReportConfig {
    /// Registers or replaces the style of a method
    pub fn register(mut self, name: &str, style: MethodStyle) -> Self {
        self.methods.insert(name.to_string(), style);
        self
    }

    /// Style of a method, its name without offset in gray when not registered
    pub fn style(&self, name: &str) -> MethodStyle {
        self.methods
            .get(name)
            .cloned()
            .unwrap_or_else(|| MethodStyle::new(name, "tab:gray", 0.))
    }

    /// Line style of a strategy, solid when not registered
    pub fn line_style(&self, strategy: &str) -> &str {
        self.strategies.get(strategy).map_or("-", |s| s.as_str())
    }
}

/// Best utility found after a given number of comparisons, over trials
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryRow {
    /// Number of comparisons
    pub n_comps: usize,
    /// Method name
    pub method: String,
    /// Method label
    pub label: String,
    /// Strategy name
    pub strategy: String,
    /// Mean over trials of the best utility so far
    pub mean: f64,
    /// Standard error of the mean, 0 with a single trial
    pub sem: f64,
    /// Number of trials
    pub count: usize,
}

/// Mean and standard error of the best utility so far, grouped by number of
/// comparisons, method and strategy.
///
/// Every run contributes its within-session checks, failed runs included up to
/// their failure.
pub fn summarize(log: &ExperimentLog, config: &ReportConfig) -> Vec<SummaryRow> {
    let mut groups: BTreeMap<(usize, String, String), Vec<f64>> = BTreeMap::new();
    for record in log.records() {
        for check in &record.within_session {
            groups
                .entry((
                    check.n_comps,
                    record.method.clone(),
                    record.strategy.clone(),
                ))
                .or_default()
                .push(check.best_util_so_far);
        }
    }
    groups
        .into_iter()
        .map(|((n_comps, method, strategy), values)| {
            let count = values.len();
            let mean = values.iter().sum::<f64>() / count as f64;
            let sem = if count > 1 {
                let var =
                    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (count - 1) as f64;
                (var / count as f64).sqrt()
            } else {
                0.
            };
            SummaryRow {
                n_comps,
                label: config.style(&method).label,
                method,
                strategy,
                mean,
                sem,
                count,
            }
        })
        .collect()
}

/// Plain text table of summary rows
pub fn render_table(rows: &[SummaryRow]) -> String {
    let mut table = format!(
        "{:>8} {:<18} {:<10} {:>10} {:>10} {:>6}\n",
        "n_comps", "method", "strategy", "mean", "sem", "trials"
    );
    for row in rows {
        // writing into a String cannot fail
        let _ = writeln!(
            table,
            "{:>8} {:<18} {:<10} {:>10.4} {:>10.4} {:>6}",
            row.n_comps, row.label, row.strategy, row.mean, row.sem, row.count
        );
    }
    table
}
