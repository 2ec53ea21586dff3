//! CLI interface for Somnus
//!
//! This module provides the command-line interface using clap's derive API.
//! It defines all commands and global flags for driving the orchestration core.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::conductor::SessionDuration;

/// Somnus bedtime story engine
///
/// Runs goal-directed bedtime story sessions against a tiered set of language
/// models, with quality gating, failure recovery and memory consolidation.
#[derive(Parser, Debug)]
#[command(name = "somnus")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL")]
    pub log: Option<String>,

    /// Specify alternate configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an interactive story session on stdin
    Session {
        /// Session to start or resume (generated when omitted)
        #[arg(long)]
        session_id: Option<String>,

        /// User the session belongs to
        #[arg(long, default_value = "local")]
        user_id: String,

        /// Session length: short, medium or long
        #[arg(short, long, default_value = "medium")]
        duration: SessionDuration,

        /// Requested story theme
        #[arg(short, long)]
        theme: Option<String>,

        /// Child's name used in greetings
        #[arg(long)]
        child_name: Option<String>,
    },

    /// Consolidate a session's episodic memory into semantic facts
    Summarize {
        /// User the session belongs to
        #[arg(long)]
        user_id: String,

        /// Session to consolidate
        #[arg(long)]
        session_id: String,
    },

    /// Run content through the verification pipeline
    Verify {
        /// Text to verify
        text: String,

        /// Content type tag
        #[arg(long, default_value = "golden_moment")]
        content_type: String,
    },

    /// List the sessions of a user
    Sessions {
        /// User whose sessions to list
        #[arg(long, default_value = "local")]
        user_id: String,
    },

    /// Show the reasoning traces of a session
    Traces {
        /// Session ID
        session_id: String,

        /// Number of traces to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Propose stories for a user
    Suggest {
        /// User to suggest for
        #[arg(long, default_value = "local")]
        user_id: String,

        /// Maximum number of suggestions
        #[arg(short, long, default_value = "3")]
        limit: usize,
    },

    /// Manage the human review queue
    Reviews {
        #[command(subcommand)]
        action: ReviewAction,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Human review queue actions
#[derive(Subcommand, Debug)]
pub enum ReviewAction {
    /// List pending review items
    List {
        /// Number of items to show (default: 20)
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Approve a pending item
    Approve {
        /// Review item ID
        id: String,
    },

    /// Reject a pending item
    Reject {
        /// Review item ID
        id: String,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Print the configuration file path
    Path,
}
