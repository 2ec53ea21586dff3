// Somnus bedtime story engine
// Main entry point for the somnus binary

use clap::Parser;
use somnus_engine::cli::{Cli, Command, ConfigAction, ReviewAction};
use somnus_engine::config::Config;
use somnus_engine::handlers::{
    handle_config_path, handle_config_show, handle_reviews_list, handle_reviews_resolve,
    handle_session, handle_sessions, handle_suggest, handle_summarize, handle_traces,
    handle_verify, OutputFormat,
};
use somnus_engine::telemetry::init_telemetry_with_level;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Text
    };

    // Load configuration (or use custom path if provided)
    let config = if let Some(config_path) = &cli.config {
        Config::load_from_path(config_path)?
    } else {
        Config::load_or_create()?
    };

    // --log wins over the configured level; RUST_LOG wins over both
    init_telemetry_with_level(cli.log.as_deref().unwrap_or(&config.core.log_level));

    tracing::info!("Somnus v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Session {
            session_id,
            user_id,
            duration,
            theme,
            child_name,
        } => {
            tracing::info!("Starting {} session for user {}", duration.as_str(), user_id);
            handle_session(session_id, user_id, duration, theme, child_name, &config, format).await
        }

        Command::Summarize {
            user_id,
            session_id,
        } => {
            tracing::info!("Consolidating session {}", session_id);
            handle_summarize(user_id, session_id, &config, format).await
        }

        Command::Verify { text, content_type } => handle_verify(text, content_type, &config, format).await,

        Command::Sessions { user_id } => handle_sessions(user_id, &config, format).await,

        Command::Traces { session_id, limit } => {
            tracing::info!("Showing last {} traces of session {}", limit, session_id);
            handle_traces(session_id, limit, &config, format).await
        }

        Command::Suggest { user_id, limit } => handle_suggest(user_id, limit, &config, format).await,

        Command::Reviews { action } => match action {
            ReviewAction::List { limit } => handle_reviews_list(limit, &config, format).await,
            ReviewAction::Approve { id } => handle_reviews_resolve(id, true, &config).await,
            ReviewAction::Reject { id } => handle_reviews_resolve(id, false, &config).await,
        },

        Command::Config { action } => match action {
            ConfigAction::Show => handle_config_show(&config, format),
            ConfigAction::Path => handle_config_path(cli.config.as_deref()),
        },
    }
}
