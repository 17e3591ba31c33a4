//! CLI commands and argument parsing

use crate::schemas::{for_kind, TAG_SCHEMA};
use crate::types::ResourceKind;
use crate::validation::Schema;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Authn custom resource CLI
#[derive(Parser, Debug)]
#[command(name = "authn-cr")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (YAML), overridden by the environment
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Process a lifecycle event and print the response
    Handle {
        /// Event file (JSON), `-` for stdin
        #[arg(short, long, default_value = "-")]
        event: String,
    },

    /// Process a secret rotation step
    Rotate {
        /// Event file (JSON), `-` for stdin
        #[arg(short, long, default_value = "-")]
        event: String,
    },

    /// Validate resource properties without calling any service
    Validate {
        /// Schema to validate against
        #[arg(short, long, value_enum)]
        kind: SchemaKind,

        /// Properties file (JSON), `-` for stdin
        #[arg(short, long, default_value = "-")]
        properties: String,
    },
}

/// Schemas available to `validate`
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SchemaKind {
    Application,
    Api,
    Grant,
    /// Stack tags copied into client metadata
    Tags,
}

impl SchemaKind {
    pub fn schema(self) -> &'static Schema {
        match self {
            SchemaKind::Application => for_kind(ResourceKind::Application),
            SchemaKind::Api => for_kind(ResourceKind::Api),
            SchemaKind::Grant => for_kind(ResourceKind::Grant),
            SchemaKind::Tags => &TAG_SCHEMA,
        }
    }
}
