//! CLI module for quest-server
//!
//! Provides command-line interface parsing for the quest-server binary.
//! Uses clap for argument parsing and owo-colors for colored terminal output.

pub mod output;

use crate::types::{ResearchDepth, ResearchOptions};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// quest-server - multi-agent research orchestrator
///
/// Decomposes a research question into sub-queries, researches them
/// concurrently, cross-validates the findings and synthesizes a cited report
/// while streaming the agents' progress.
#[derive(Parser, Debug)]
#[command(
    name = "quest-server",
    version,
    about = "Multi-agent research orchestrator",
    after_help = "EXAMPLES:\n    \
                  quest-server serve                          # Start the HTTP server\n    \
                  quest-server serve --port 8080              # Override the configured port\n    \
                  quest-server research \"impact of X on Y\"    # Run one session in the terminal\n    \
                  quest-server research \"...\" --depth deep --breadth 4"
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = crate::utils::toml_config::DEFAULT_CONFIG_FILE, global = true)]
    pub config: PathBuf,

    /// Log as JSON lines instead of human-readable text
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host address to bind (overrides the configuration)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides the configuration)
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run one research session in-process and print its events and report
    Research {
        /// The research question
        query: String,

        /// How thoroughly each sub-query is researched
        #[arg(long, value_enum, default_value_t = DepthArg::Standard)]
        depth: DepthArg,

        /// Subject-area hint for the planner
        #[arg(long)]
        domain: Option<String>,

        /// Desired number of sub-queries (can only lower the configured cap)
        #[arg(long)]
        breadth: Option<usize>,

        /// Hide "thinking" events
        #[arg(short, long)]
        quiet: bool,
    },
}

/// Research depth as a CLI value
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthArg {
    Quick,
    Standard,
    Deep,
    Comprehensive,
}

impl From<DepthArg> for ResearchDepth {
    fn from(depth: DepthArg) -> Self {
        match depth {
            DepthArg::Quick => ResearchDepth::Quick,
            DepthArg::Standard => ResearchDepth::Standard,
            DepthArg::Deep => ResearchDepth::Deep,
            DepthArg::Comprehensive => ResearchDepth::Comprehensive,
        }
    }
}

/// Build session options from `research` arguments.
pub fn research_options(
    depth: DepthArg,
    domain: Option<String>,
    breadth: Option<usize>,
) -> ResearchOptions {
    ResearchOptions {
        domain,
        breadth,
        depth: depth.into(),
        user_id: None,
    }
}

impl Cli {
    /// Parse CLI arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
