//! kmeans CLI - cluster a point file with Lloyd's algorithm.

use anyhow::Context;
use clap::{Parser, ValueEnum};
use giztoy_kmeans::{Algorithm, EmptyClusterPolicy, KMeans};
use tracing_subscriber::EnvFilter;

mod util;

use util::{ClusterReport, load_input, output_result};

/// kmeans CLI - cluster points with a dual-tree accelerated Lloyd's algorithm.
///
/// The input file holds `points` (a list of equally sized rows) and an
/// optional `config` section. Flags override the file.
#[derive(Parser)]
#[command(name = "kmeans")]
#[command(about = "Cluster points from a JSON or YAML file")]
#[command(version)]
pub struct Cli {
    /// Input points file (YAML or JSON)
    #[arg(short = 'f', long = "file")]
    pub input: String,

    /// Number of clusters
    #[arg(short = 'k', long)]
    pub clusters: Option<usize>,

    /// Maximum number of Lloyd rounds
    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Stop once the residual drops below this
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Maximum points per tree leaf
    #[arg(long)]
    pub leaf_size: Option<usize>,

    /// Seed for the initial centroids
    #[arg(long)]
    pub seed: Option<u64>,

    /// Lloyd step implementation
    #[arg(long, value_enum)]
    pub algorithm: Option<AlgorithmArg>,

    /// What to do with clusters that lose all their points
    #[arg(long, value_enum)]
    pub empty_cluster: Option<EmptyClusterArg>,

    /// Output file (default: stdout)
    #[arg(short = 'o', long)]
    pub output: Option<String>,

    /// Output as JSON (default is YAML)
    #[arg(long)]
    pub json: bool,

    /// Verbose output
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum AlgorithmArg {
    DualTree,
    Naive,
}

impl From<AlgorithmArg> for Algorithm {
    fn from(a: AlgorithmArg) -> Self {
        match a {
            AlgorithmArg::DualTree => Algorithm::DualTree,
            AlgorithmArg::Naive => Algorithm::Naive,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
pub enum EmptyClusterArg {
    Keep,
    Farthest,
}

impl From<EmptyClusterArg> for EmptyClusterPolicy {
    fn from(p: EmptyClusterArg) -> Self {
        match p {
            EmptyClusterArg::Keep => EmptyClusterPolicy::Keep,
            EmptyClusterArg::Farthest => EmptyClusterPolicy::Farthest,
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_target(false)
            .init();
    }

    let input = load_input(&cli.input)?;
    let k = cli
        .clusters
        .or(input.k)
        .ok_or_else(|| anyhow::anyhow!("number of clusters is required, use -k or set k in the input file"))?;
    let dataset = input.dataset()?;
    let cfg = util::apply_flags(input.config, &cli);

    tracing::info!(
        points = dataset.len(),
        dim = dataset.dim(),
        k,
        algorithm = ?cfg.algorithm,
        "clustering"
    );
    let km = KMeans::new(cfg);
    let result = km
        .cluster(&dataset, k)
        .with_context(|| format!("failed to cluster {}", cli.input))?;

    output_result(&ClusterReport::from(result), cli.output.as_deref(), cli.json)
}
