//! Command line argument parsing
//!
//! Subcommands:
//! - `analyze`: Score a task and show the resources it would need
//! - `synthesize`: Synthesize one tool or hook, optionally exporting its source
//! - `run`: Assign a task to a built-in shell worker and run it
//! - `show-config`: Show configuration discovery information
//! - `init-config`: Write a default user configuration file

use crate::synthesis::ResourceCategory;
use crate::task::TaskKind;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "agent-forge")]
#[command(author = "Agent Forge Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Assigns tasks to template-defined workers, synthesizing tools and hooks on demand")]
#[command(long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Args {
    /// Configuration file path (skips discovery)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,
    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Analyze a task's complexity and required resources
    Analyze {
        #[arg(short = 't', long = "title")]
        title: String,
        #[arg(short = 'd', long = "description", default_value = "")]
        description: String,
        /// Task kind (feature, bugfix, refactor, docs, test, deployment)
        #[arg(short = 'k', long = "kind", default_value = "feature")]
        kind: TaskKind,
    },
    /// Synthesize a tool or hook resource
    Synthesize {
        #[arg(short = 'n', long = "name")]
        name: String,
        /// Resource category (tool or hook)
        #[arg(long = "category", default_value = "tool")]
        category: ResourceCategory,
        /// command/api/library/service for tools, pre/post/error for hooks
        #[arg(short = 'k', long = "kind")]
        kind: String,
        /// Parameter as KEY=VALUE; JSON values are parsed, anything else is a string
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE", value_parser = parse_key_value)]
        params: Vec<(String, Value)>,
        /// Write the generated source to this file or directory
        #[arg(long = "export", value_name = "PATH")]
        export: Option<PathBuf>,
    },
    /// Assign a task to a shell worker and run it
    Run {
        #[arg(short = 't', long = "title")]
        title: String,
        #[arg(short = 'd', long = "description", default_value = "")]
        description: String,
        #[arg(short = 'k', long = "kind", default_value = "feature")]
        kind: TaskKind,
        /// Shell command the worker runs
        #[arg(long = "command")]
        command: String,
    },
    /// Show configuration discovery information
    ShowConfig,
    /// Create a default user configuration file
    InitConfig,
}

/// Parse `KEY=VALUE`, reading VALUE as JSON when it parses and as a string otherwise
pub fn parse_key_value(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("program=git").unwrap(),
            ("program".to_string(), Value::String("git".to_string()))
        );
        assert_eq!(
            parse_key_value("args=[\"status\"]").unwrap(),
            ("args".to_string(), serde_json::json!(["status"]))
        );
        assert_eq!(parse_key_value("timeout=5").unwrap().1, serde_json::json!(5));
        assert!(parse_key_value("novalue").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_synthesize_args() {
        let args = Args::try_parse_from([
            "agent-forge",
            "synthesize",
            "--name",
            "lint",
            "--kind",
            "command",
            "--param",
            "program=eslint",
            "--export",
            "out",
        ])
        .unwrap();

        match args.command {
            Commands::Synthesize {
                name,
                category,
                kind,
                params,
                export,
            } => {
                assert_eq!(name, "lint");
                assert_eq!(category, ResourceCategory::Tool);
                assert_eq!(kind, "command");
                assert_eq!(params.len(), 1);
                assert_eq!(export, Some(PathBuf::from("out")));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_kind() {
        let result = Args::try_parse_from(["agent-forge", "analyze", "--title", "x", "--kind", "poetry"]);
        assert!(result.is_err());
    }
}
