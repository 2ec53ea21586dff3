//! Command handlers for CLI operations
//!
//! This module implements the handlers for all CLI commands:
//! - session: interactive story session on stdin
//! - summarize: consolidate a session's episodic memory
//! - verify: run text through the verification pipeline
//! - sessions / traces: inspect stored sessions and reasoning traces
//! - suggest: propose stories for a user
//! - reviews: work the human review queue
//! - config: show the effective configuration

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use uuid::Uuid;

use sdk::session::SessionPhase;
use sdk::types::{ReasoningTrace, VerifiableContent};

use crate::conductor::{
    ConductorAgent, ConductorPorts, ConductorSettings, SessionConfig, SessionDuration,
    SuggestionContext, TurnContext, TurnResult,
};
use crate::config::Config;
use crate::db::{Database, MemoryRepository, ReviewQueue, SessionRepository, TraceRepository};
use crate::llm::ModelRouter;
use crate::memory::{MemorySummarizationService, SessionConsolidator, SessionSummarizer};
use crate::message_bus::MessageBus;
use crate::quality::QualityGate;
use crate::resilience::DefaultResiliencePolicy;

/// Output format for command results
#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for machine consumption
    Json,
}

/// Everything a command needs, wired from configuration
pub struct Runtime {
    database: Database,
    bus: Arc<MessageBus>,
    conductor: ConductorAgent,
    summarizer: Arc<MemorySummarizationService>,
    sessions: Arc<SessionRepository>,
    memories: Arc<MemoryRepository>,
    traces: Arc<TraceRepository>,
    reviews: Arc<ReviewQueue>,
    consolidator: JoinHandle<()>,
}

impl Runtime {
    /// Open the database and wire the conductor, stores and background consolidation
    pub async fn build(config: &Config) -> Result<Self> {
        let database = Database::new(&config.database_path())
            .await
            .context("Failed to open database")?;

        let sessions = Arc::new(database.sessions(config.memory.history_limit));
        let memories = Arc::new(database.memories());
        let traces = Arc::new(database.traces());
        let reviews = Arc::new(database.reviews());

        let ai = Arc::new(ModelRouter::from_config(&config.llm, &config.resilience));
        let bus = Arc::new(MessageBus::new());

        let summarizer = Arc::new(MemorySummarizationService::new(
            Arc::clone(&memories) as _,
            Arc::clone(&ai) as _,
            config.memory.clone(),
        ));
        let consolidator = Arc::new(SessionConsolidator::new(
            Arc::clone(&summarizer) as _,
            Arc::clone(&sessions) as _,
        ))
        .spawn(&bus)
        .await;

        let ports = ConductorPorts {
            ai,
            sessions: Arc::clone(&sessions) as _,
            memory: Arc::clone(&memories) as _,
            traces: Arc::clone(&traces) as _,
            review: Arc::clone(&reviews) as _,
        };
        let strategy = Arc::new(DefaultResiliencePolicy::new(
            config.resilience.clone(),
            config.llm.default_tier,
        ));
        let conductor = ConductorAgent::new(
            ports,
            strategy,
            Arc::clone(&bus),
            QualityGate::from_config(&config.quality),
            ConductorSettings::from_config(config),
        )
        .context("Failed to build conductor")?;

        Ok(Self {
            database,
            bus,
            conductor,
            summarizer,
            sessions,
            memories,
            traces,
            reviews,
            consolidator,
        })
    }

    /// Let in-flight consolidation finish, then close the database
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            database,
            bus,
            conductor,
            consolidator,
            ..
        } = self;

        // Dropping every bus handle closes the consolidator's channels
        drop(conductor);
        drop(bus);
        if let Err(e) = consolidator.await {
            tracing::warn!("Consolidator task ended abnormally: {}", e);
        }

        database.close().await
    }
}

/// Run an interactive story session
///
/// Reads one utterance per line from stdin until EOF or until the child falls
/// asleep.
pub async fn handle_session(
    session_id: Option<String>,
    user_id: String,
    duration: SessionDuration,
    theme: Option<String>,
    child_name: Option<String>,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let mut session = SessionConfig::new(session_id.as_str(), user_id).with_duration(duration);
    session.theme = theme;
    session.child_name = child_name;

    let opening = runtime.conductor.conduct_story_session(&session).await?;
    print_turn(&opening, format)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut phase = opening.phase;

    while phase != SessionPhase::Asleep {
        let Some(line) = lines.next_line().await.context("Failed to read stdin")? else {
            break;
        };
        let message = line.trim();
        if message.is_empty() {
            continue;
        }

        let context = TurnContext::new(session_id.as_str()).with_request_id(Uuid::new_v4().to_string());
        let result = runtime.conductor.process_turn(message, &context).await?;
        print_turn(&result, format)?;
        phase = result.phase;
    }

    runtime.shutdown().await
}

fn print_turn(result: &TurnResult, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", result.reply);
            if result.trace.is_safe_mode() {
                println!("  [safe mode: {}]", result.trace.thought);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string(result)?),
    }
    Ok(())
}

/// Consolidate a session's episodic memory
pub async fn handle_summarize(
    user_id: String,
    session_id: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let facts = runtime
        .summarizer
        .summarize_session(&user_id, &session_id)
        .await;
    let total = runtime
        .memories
        .count(&user_id, sdk::types::MemoryKind::Semantic)
        .await
        .context("Failed to count semantic memories")?;

    match format {
        OutputFormat::Text => {
            println!("Stored {} new fact(s) for session {}", facts, session_id);
            println!("User {} now has {} semantic memories", user_id, total);
        }
        OutputFormat::Json => {
            let output = json!({
                "sessionId": session_id,
                "userId": user_id,
                "factsStored": facts,
                "semanticTotal": total,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    runtime.shutdown().await
}

/// Run text through the verification pipeline
pub async fn handle_verify(
    text: String,
    content_type: String,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let content = VerifiableContent::new(content_type, json!({ "text": text }));
    let result = runtime.conductor.verification().verify(&content).await;

    match format {
        OutputFormat::Text => {
            let verdict = if result.approved { "APPROVED" } else { "NOT APPROVED" };
            println!("{} at stage {}", verdict, result.stage);
            println!("  Confidence: {:.2}", result.confidence);
            println!("  Reason: {}", result.reason);
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }

    runtime.shutdown().await
}

/// List a user's sessions
pub async fn handle_sessions(user_id: String, config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let ids = runtime
        .sessions
        .list_for_user(&user_id)
        .await
        .context("Failed to list sessions")?;

    let mut rows = Vec::with_capacity(ids.len());
    for id in ids {
        if let Some(state) = runtime.sessions.load(&id).await? {
            rows.push((id, state.snapshot()));
        }
    }

    match format {
        OutputFormat::Text => {
            if rows.is_empty() {
                println!("No sessions for user {}", user_id);
            }
            for (id, snapshot) in &rows {
                println!("{}  {}  goals: {}", id, snapshot.phase, snapshot.active_goals.join("; "));
            }
        }
        OutputFormat::Json => {
            let sessions: Vec<_> = rows
                .iter()
                .map(|(id, snapshot)| json!({ "sessionId": id, "state": snapshot }))
                .collect();
            let output = json!({ "userId": user_id, "sessions": sessions });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    runtime.shutdown().await
}

/// Show the reasoning traces of a session
pub async fn handle_traces(
    session_id: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let traces = runtime
        .traces
        .recent(&session_id, limit)
        .await
        .context("Failed to fetch traces")?;

    match format {
        OutputFormat::Text => {
            if traces.is_empty() {
                println!("No traces for session {}", session_id);
            }
            for trace in &traces {
                print_trace(trace);
            }
        }
        OutputFormat::Json => {
            let output = json!({
                "sessionId": session_id,
                "traces": traces,
                "count": traces.len(),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    runtime.shutdown().await
}

fn print_trace(trace: &ReasoningTrace) {
    let when = chrono::DateTime::from_timestamp_millis(trace.timestamp)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "Unknown".to_string());

    println!("{}  {}  (confidence {:.2})", when, trace.action, trace.confidence);
    println!("  {}", trace.thought);
    if let Some(notes) = &trace.contextual_notes {
        println!("  Notes: {}", notes);
    }
    if let Some(meta) = &trace.resilience_meta {
        println!(
            "  Recovery: {} -> {} (${:.4})",
            meta.failure_encountered, meta.correction_attempted, meta.recovery_cost_usd
        );
    }
    println!();
}

/// Propose stories for a user
pub async fn handle_suggest(
    user_id: String,
    limit: usize,
    config: &Config,
    format: OutputFormat,
) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let context = SuggestionContext {
        user_id,
        limit: Some(limit),
        ..SuggestionContext::default()
    };
    let suggestions = runtime.conductor.generate_suggestions(&context).await;

    match format {
        OutputFormat::Text => {
            if suggestions.is_empty() {
                println!("No suggestions right now");
            }
            for suggestion in &suggestions {
                println!("{} ({}), confidence {:.2}", suggestion.title, suggestion.theme, suggestion.confidence);
                println!("  Why: {}", suggestion.reasoning);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&suggestions)?),
    }

    runtime.shutdown().await
}

/// List pending human review items
pub async fn handle_reviews_list(limit: usize, config: &Config, format: OutputFormat) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    let pending = runtime.reviews.pending(limit).await?;

    match format {
        OutputFormat::Text => {
            if pending.is_empty() {
                println!("Review queue is empty");
            }
            for review in &pending {
                println!("{}  [{}] confidence {:.2}", review.id, review.item.content_type, review.confidence);
                println!("  {}", review.item.primary_text().unwrap_or("<no text>"));
                println!("  Reason: {}", review.reason);
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&pending)?),
    }

    runtime.shutdown().await
}

/// Record a human decision on a review item
pub async fn handle_reviews_resolve(id: String, approved: bool, config: &Config) -> Result<()> {
    let runtime = Runtime::build(config).await?;

    runtime.reviews.resolve(&id, approved).await?;
    println!(
        "Review item {} {}",
        id,
        if approved { "approved" } else { "rejected" }
    );

    runtime.shutdown().await
}

/// Show the effective configuration
pub fn handle_config_show(config: &Config, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("{}", toml::to_string_pretty(config).context("Failed to render config")?)
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
    }
    Ok(())
}

/// Print the configuration file in use
pub fn handle_config_path(explicit: Option<&std::path::Path>) -> Result<()> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => Config::default_config_path()?,
    };
    println!("{}", path.display());
    Ok(())
}
