//! Input loading and result output.

use std::path::Path;

use anyhow::Context;
use giztoy_kmeans::{Clustering, KMeansConfig};
use giztoy_spacetree::Dataset;
use serde::{Deserialize, Serialize};

use crate::Cli;

/// Contents of an input file.
#[derive(Debug, Deserialize)]
pub struct Input {
    pub points: Vec<Vec<f64>>,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub config: KMeansConfig,
}

impl Input {
    pub fn dataset(&self) -> anyhow::Result<Dataset> {
        Dataset::from_rows(&self.points).context("invalid points")
    }
}

/// Loads an input file as YAML or JSON, picked by extension.
pub fn load_input(path: &str) -> anyhow::Result<Input> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("failed to read {path}"))?;
    parse_input(&content, path)
}

fn parse_input(content: &str, path: &str) -> anyhow::Result<Input> {
    let ext = Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("yaml");

    let input = match ext.to_lowercase().as_str() {
        "json" => serde_json::from_str(content)?,
        _ => serde_yaml::from_str(content)?,
    };
    Ok(input)
}

/// Overrides file configuration with command line flags.
pub fn apply_flags(mut cfg: KMeansConfig, cli: &Cli) -> KMeansConfig {
    if let Some(v) = cli.max_iterations {
        cfg.max_iterations = v;
    }
    if let Some(v) = cli.tolerance {
        cfg.tolerance = v;
    }
    if let Some(v) = cli.leaf_size {
        cfg.leaf_size = v;
    }
    if let Some(v) = cli.seed {
        cfg.seed = v;
    }
    if let Some(v) = cli.algorithm {
        cfg.algorithm = v.into();
    }
    if let Some(v) = cli.empty_cluster {
        cfg.empty_cluster = v.into();
    }
    cfg
}

/// Serializable view of a [`Clustering`].
#[derive(Debug, Serialize)]
pub struct ClusterReport {
    pub centroids: Vec<Vec<f64>>,
    pub counts: Vec<usize>,
    pub assignments: Vec<usize>,
    pub iterations: usize,
    pub residual: f64,
    pub converged: bool,
}

impl From<Clustering> for ClusterReport {
    fn from(c: Clustering) -> Self {
        Self {
            centroids: c.centroids.to_rows(),
            counts: c.counts,
            assignments: c.assignments,
            iterations: c.iterations,
            residual: c.residual,
            converged: c.converged,
        }
    }
}

/// Outputs result as JSON or YAML.
pub fn output_result<T: Serialize>(
    result: &T,
    output_path: Option<&str>,
    as_json: bool,
) -> anyhow::Result<()> {
    let output = if as_json {
        serde_json::to_string_pretty(result)?
    } else {
        serde_yaml::to_string(result)?
    };

    match output_path {
        Some(path) => std::fs::write(path, output).with_context(|| format!("failed to write {path}"))?,
        None => print!("{}", output),
    }

    Ok(())
}
