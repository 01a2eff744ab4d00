use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use snowgen::{Layout, LayoutConfig};

/// Command-line interface for the `snowgen` binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "snowgen",
    version,
    about = "Generate and decode time-ordered 64-bit Snowflake IDs"
)]
pub struct Cli {
    #[command(flatten)]
    pub config: CliArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate new IDs, one per line.
    Generate {
        /// How many IDs to generate.
        #[arg(short = 'n', long, default_value_t = 1)]
        count: usize,

        /// Print a JSON array with each ID and its fields.
        #[arg(long)]
        json: bool,
    },

    /// Split IDs into timestamp, node, process and sequence.
    Decompose {
        /// IDs produced under the configured layout.
        #[arg(required = true, allow_negative_numbers = true)]
        ids: Vec<i64>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Show the effective bit layout.
    Layout {
        /// Print JSON instead of a diagram.
        #[arg(long)]
        json: bool,
    },
}

/// Discriminators and layout, from flags, environment, or a config file.
///
/// Precedence, highest first: command-line flag, environment variable,
/// config file, built-in default.
#[derive(Args, Debug, Clone, Default)]
pub struct CliArgs {
    /// Node discriminator; must be unique per machine in the fleet.
    ///
    /// Environment variable: `SNOWGEN_NODE_ID`
    #[arg(long, global = true, env = "SNOWGEN_NODE_ID")]
    pub node_id: Option<u64>,

    /// Process discriminator; must be unique per process on a node.
    ///
    /// Typically the worker index assigned by a process supervisor.
    ///
    /// Environment variable: `SNOWGEN_PROCESS_ID`
    #[arg(long, global = true, env = "SNOWGEN_PROCESS_ID")]
    pub process_id: Option<u64>,

    /// Width of the node field in bits.
    ///
    /// Environment variable: `SNOWGEN_NODE_BITS`
    #[arg(long, global = true, env = "SNOWGEN_NODE_BITS")]
    pub node_bits: Option<u32>,

    /// Width of the process field in bits.
    ///
    /// Environment variable: `SNOWGEN_PROCESS_BITS`
    #[arg(long, global = true, env = "SNOWGEN_PROCESS_BITS")]
    pub process_bits: Option<u32>,

    /// Width of the sequence field in bits.
    ///
    /// Environment variable: `SNOWGEN_SEQUENCE_BITS`
    #[arg(long, global = true, env = "SNOWGEN_SEQUENCE_BITS")]
    pub sequence_bits: Option<u32>,

    /// Epoch in milliseconds since 1970-01-01T00:00:00Z.
    ///
    /// Environment variable: `SNOWGEN_EPOCH`
    #[arg(long, global = true, env = "SNOWGEN_EPOCH")]
    pub epoch: Option<u64>,

    /// JSON file with `node_id`, `process_id` and a `layout` object.
    ///
    /// Environment variable: `SNOWGEN_CONFIG`
    #[arg(long, global = true, env = "SNOWGEN_CONFIG")]
    pub config: Option<PathBuf>,
}

/// On-disk configuration. Every key is optional.
///
/// ```json
/// {
///   "node_id": 3,
///   "process_id": 17,
///   "layout": { "node_bits": 3, "process_bits": 7, "sequence_bits": 12 }
/// }
/// ```
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub node_id: Option<u64>,
    pub process_id: Option<u64>,
    pub layout: LayoutConfig,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file `{}`", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file `{}`", path.display()))
    }
}

/// Validated configuration for building an
/// [`IdGenerator`](snowgen::IdGenerator).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CliConfig {
    pub node_id: u64,
    pub process_id: u64,
    pub layout: Layout,
}

impl TryFrom<CliArgs> for CliConfig {
    type Error = anyhow::Error;

    fn try_from(args: CliArgs) -> Result<Self, Self::Error> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let layout = LayoutConfig {
            node_bits: args.node_bits.unwrap_or(file.layout.node_bits),
            process_bits: args.process_bits.unwrap_or(file.layout.process_bits),
            sequence_bits: args.sequence_bits.unwrap_or(file.layout.sequence_bits),
            epoch_millis: args.epoch.unwrap_or(file.layout.epoch_millis),
        };
        let layout = Layout::try_from(layout).context("invalid bit layout")?;

        // A process without an assigned worker index runs as process 0.
        let node_id = args.node_id.or(file.node_id).unwrap_or(0);
        let process_id = args.process_id.or(file.process_id).unwrap_or(0);
        layout
            .check_discriminators(node_id, process_id)
            .context("invalid discriminators")?;

        Ok(Self {
            node_id,
            process_id,
            layout,
        })
    }
}
