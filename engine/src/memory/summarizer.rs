//! Memory summarization service
//!
//! Retrieves up to `summary_window` episodic memories of a session, renders
//! them as an indexed transcript and asks the AI capability for facts of the
//! shape `{fact, confidence, lineReference}`. Each fact is anchored to the
//! transcript line it cites, carrying forward that line's `traceId`, and stored
//! as a SEMANTIC memory.

use async_trait::async_trait;
use sdk::capability::{AgentMemoryStore, AiCapability, PromptRequest};
use sdk::helpers::clamp_unit;
use sdk::types::{MemoryContext, MemoryKind, MemoryRecord, SemanticFact, SourceAnchor};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::SessionSummarizer;
use crate::conductor::prompts;
use crate::config::MemoryConfig;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractedFact {
    fact: String,
    #[serde(default)]
    confidence: f64,
    line_reference: i64,
}

pub struct MemorySummarizationService {
    memory: Arc<dyn AgentMemoryStore>,
    ai: Arc<dyn AiCapability>,
    config: MemoryConfig,
}

impl MemorySummarizationService {
    pub fn new(
        memory: Arc<dyn AgentMemoryStore>,
        ai: Arc<dyn AiCapability>,
        config: MemoryConfig,
    ) -> Self {
        Self { memory, ai, config }
    }

    async fn consolidate(&self, user_id: &str, session_id: &str) -> usize {
        let context = MemoryContext::new(user_id, session_id);

        let memories = match self
            .memory
            .retrieve("", &context, MemoryKind::Episodic, self.config.summary_window)
            .await
        {
            Ok(memories) => memories,
            Err(e) => {
                warn!(session_id, "Failed to load episodic memories: {}", e);
                return 0;
            }
        };

        if memories.is_empty() {
            debug!(session_id, "No episodic memories to consolidate");
            return 0;
        }

        let request = PromptRequest::new(
            prompts::summarizer_system_prompt(),
            prompts::indexed_transcript(&memories),
        )
        .with_tier(self.config.summary_tier);

        let response = match self
            .ai
            .generate_structured(&prompts::fact_extraction_schema(), &request)
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(session_id, "Fact extraction failed: {}", e);
                return 0;
            }
        };

        let facts = resolve_facts(session_id, &memories, &response);
        let mut stored = 0;

        for fact in facts {
            let metadata = json!({
                "sourceAnchor": fact.source_anchor,
                "confidence": fact.confidence,
            });

            match self
                .memory
                .store(&fact.fact, MemoryKind::Semantic, &context, metadata)
                .await
            {
                Ok(_) => stored += 1,
                Err(e) => warn!(session_id, "Failed to store semantic fact: {}", e),
            }
        }

        info!(
            session_id,
            episodes = memories.len(),
            facts = stored,
            "Consolidated session memory"
        );

        stored
    }
}

#[async_trait]
impl SessionSummarizer for MemorySummarizationService {
    async fn summarize_session(&self, user_id: &str, session_id: &str) -> usize {
        self.consolidate(user_id, session_id).await
    }
}

/// Turn an extraction response into anchored facts
///
/// Accepts `{"facts": [...]}` or a bare array. Malformed entries, blank facts
/// and line references outside the transcript are skipped.
pub fn resolve_facts(session_id: &str, memories: &[MemoryRecord], response: &Value) -> Vec<SemanticFact> {
    let entries = match response {
        Value::Array(entries) => entries.as_slice(),
        other => match other.get("facts").and_then(Value::as_array) {
            Some(entries) => entries.as_slice(),
            None => {
                warn!(session_id, "Fact extraction response has no facts array");
                return Vec::new();
            }
        },
    };

    let mut facts = Vec::with_capacity(entries.len());

    for entry in entries {
        let extracted: ExtractedFact = match serde_json::from_value(entry.clone()) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(session_id, "Skipping malformed fact: {}", e);
                continue;
            }
        };

        if extracted.fact.trim().is_empty() {
            warn!(session_id, "Skipping blank fact");
            continue;
        }

        let Some((offset, source)) = usize::try_from(extracted.line_reference)
            .ok()
            .and_then(|offset| memories.get(offset).map(|source| (offset, source)))
        else {
            warn!(
                session_id,
                line_reference = extracted.line_reference,
                "Skipping fact with out-of-range line reference"
            );
            continue;
        };

        facts.push(SemanticFact {
            fact: extracted.fact.trim().to_string(),
            confidence: clamp_unit(extracted.confidence),
            source_anchor: SourceAnchor {
                session_id: session_id.to_string(),
                transcript_offset: offset,
                trace_id: source.trace_id().map(str::to_string),
            },
        });
    }

    facts
}
