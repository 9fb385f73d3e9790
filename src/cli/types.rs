//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(about = "Scout - bandit model state manager", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file (defaults to .scout/config.yaml and .scout/local.yaml)
    #[arg(long, global = true, env = "SCOUT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Decision policy a new model is created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    EpsilonGreedy,
    Random,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new model
    Create {
        /// Model name
        #[arg(short, long)]
        name: String,

        /// Arm as LABEL or ID=LABEL (repeatable, at least one)
        #[arg(short = 'a', long = "variant", required = true)]
        variants: Vec<String>,

        /// Decision policy
        #[arg(short, long, value_enum, default_value = "epsilon-greedy")]
        policy: PolicyArg,

        /// Exploration rate for epsilon-greedy (0.0 - 1.0)
        #[arg(short, long)]
        epsilon: Option<f64>,
    },

    /// List models
    List,

    /// Show a model summary
    Show {
        /// Model ID
        model_id: String,
    },

    /// Show trails, ratios and feature breakdown of a model
    Details {
        /// Model ID
        model_id: String,
    },

    /// Recommend an arm
    Recommend {
        /// Model ID
        model_id: String,

        /// Context as a JSON object
        #[arg(short, long)]
        context: Option<String>,

        /// Request ID to stash the context under (generated if omitted)
        #[arg(short, long)]
        request_id: Option<String>,
    },

    /// Report a reward
    Update {
        /// Model ID
        model_id: String,

        /// Chosen arm, by label or numeric ID
        #[arg(short, long, required_unless_present = "file")]
        decision: Option<String>,

        /// Observed reward
        #[arg(short, long, allow_negative_numbers = true, required_unless_present = "file")]
        reward: Option<f64>,

        /// Context as a JSON object
        #[arg(short, long)]
        context: Option<String>,

        /// Request ID of the recommendation, to reuse its stashed context
        #[arg(long)]
        request_id: Option<String>,

        /// JSON file holding an array of updates
        #[arg(short, long, conflicts_with_all = ["decision", "reward", "context", "request_id"])]
        file: Option<PathBuf>,
    },

    /// Serve one arm for every recommendation
    Rollout {
        /// Model ID
        model_id: String,

        /// Arm, by label or numeric ID
        arm: String,
    },

    /// Return a model to its decision policy
    ClearRollout {
        /// Model ID
        model_id: String,
    },

    /// Delete a model
    Delete {
        /// Model ID
        model_id: String,
    },

    /// Check the shared store
    Health,

    /// Print the effective configuration
    Config,
}
