//! Prompt templates and canned replies
//!
//! Pure functions keyed by purpose. Nothing here holds state or talks to a
//! provider; the conductor, the verification pipeline and the summarizer build
//! their requests from these.

use sdk::session::{SessionPhase, SessionState};
use sdk::types::{MemoryRecord, VerifiableContent};
use serde_json::{json, Value};

use super::intent::Intent;
use super::planner::AgendaItem;
use super::types::SessionConfig;

const CONDUCTOR_SYSTEM: &str = "You are Somnus, a gentle bedtime storyteller for young children. \
You guide a session through its agenda: onboarding, storytelling, reflection and wind-down. \
Keep replies short, warm and calming, and slow the pace as the session approaches sleep. \
Never include frightening, violent or adult content.\n\n\
Respond with a single JSON object with these fields:\n\
- \"thought\": your private reasoning about what the child needs right now\n\
- \"reply\": what you say to the child\n\
- \"action\": a short label for what you are doing (e.g. CONTINUE_STORY, ASK_CHOICE, SOOTHE)\n\
- \"goalsConsidered\": array of the goals you weighed\n\
- \"conflictDetected\": true if goals pulled in different directions\n\
- \"conflictsIdentified\": optional explanation of the conflict\n\
- \"tradeOffMade\": optional explanation of how you resolved it\n\
- \"confidence\": number between 0 and 1\n\
- \"emotionalTone\": number between 0 (calm) and 1 (excited) for your reply\n\
- \"goalComplete\": true when the current agenda goal has been reached";

const STRICT_SCHEMA_SUFFIX: &str = "\n\nYour previous answer could not be parsed. \
Output ONLY the JSON object, with no markdown and no explanation.";

/// System prompt for the conductor's reasoning step
pub fn conductor_system_prompt(strict: bool) -> String {
    if strict {
        format!("{CONDUCTOR_SYSTEM}{STRICT_SCHEMA_SUFFIX}")
    } else {
        CONDUCTOR_SYSTEM.to_string()
    }
}

/// User prompt opening a new or resumed session
pub fn session_opening_prompt(config: &SessionConfig, agenda: &[AgendaItem], resumed: bool) -> String {
    let mut prompt = String::new();
    if resumed {
        prompt.push_str("The child has come back to an unfinished session. Welcome them back.\n");
    } else {
        prompt.push_str("A new bedtime session is starting. Greet the child.\n");
    }
    if let Some(name) = &config.child_name {
        prompt.push_str(&format!("Child's name: {name}\n"));
    }
    if let Some(theme) = &config.theme {
        prompt.push_str(&format!("Requested story theme: {theme}\n"));
    }
    prompt.push_str(&format!("Session length: {}\nAgenda:\n", config.duration));
    for (i, item) in agenda.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] {} (~{} min)\n",
            i + 1,
            item.phase,
            item.goal,
            item.estimated_minutes
        ));
    }
    prompt
}

/// User prompt for one conversational turn
pub fn turn_prompt(state: &SessionState, message: &str, intent: Intent, truncate_history: bool) -> String {
    let mut prompt = format!(
        "Phase: {}\nCurrent goals: {}\nEmotional tone: {:.2}\nDetected intent: {}\n",
        state.phase(),
        state.active_goals().join("; "),
        state.emotional_tone(),
        intent
    );

    if let (Some(beat), Some(total)) = (state.context_u64("storyBeat"), state.context_u64("totalBeats")) {
        if state.phase() == SessionPhase::Storytelling {
            prompt.push_str(&format!("Story beat: {} of {}\n", beat + 1, total));
        }
    }

    if !truncate_history {
        if let Some(Value::String(last)) = state.context_value("lastReply") {
            prompt.push_str(&format!("Your previous reply: {last}\n"));
        }
    }

    prompt.push_str(&format!("\nChild says: {message}"));
    prompt
}

/// System prompt for episodic-to-semantic fact extraction
pub fn summarizer_system_prompt() -> &'static str {
    "You consolidate a bedtime conversation transcript into durable facts about the child: \
preferences, fears, favourite characters, recurring themes and milestones. \
Each transcript line is prefixed with its zero-based index in square brackets. \
For every fact, set lineReference to the index of the line that supports it best. \
Only extract facts that are clearly stated. Return JSON matching the schema."
}

/// Render the indexed transcript the summarizer reads
pub fn indexed_transcript(memories: &[MemoryRecord]) -> String {
    memories
        .iter()
        .enumerate()
        .map(|(i, memory)| format!("[{}] {}: {}", i, memory.role().unwrap_or("unknown"), memory.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Schema of the fact extraction response
pub fn fact_extraction_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "facts": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "fact": {"type": "string"},
                        "confidence": {"type": "number"},
                        "lineReference": {"type": "integer"}
                    },
                    "required": ["fact", "confidence", "lineReference"]
                }
            }
        },
        "required": ["facts"]
    })
}

/// System prompt for the MODEL verification stage
pub fn verification_system_prompt() -> &'static str {
    "You review content generated for a children's bedtime product before it is saved or shared. \
Approve only content that is age-appropriate, kind, free of personal data and coherent. \
Return JSON with approved (boolean), reason (string) and confidence (0 to 1)."
}

/// User prompt for the MODEL verification stage
pub fn verification_prompt(content: &VerifiableContent) -> String {
    format!(
        "Content type: {}\nContent:\n{}\nMetadata: {}",
        content.content_type,
        content
            .primary_text()
            .map(str::to_string)
            .unwrap_or_else(|| content.payload.to_string()),
        content.metadata
    )
}

/// Schema of the verification judgment
pub fn verification_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "approved": {"type": "boolean"},
            "reason": {"type": "string"},
            "confidence": {"type": "number"}
        },
        "required": ["approved", "reason", "confidence"]
    })
}

/// System prompt for proactive story suggestions
pub fn suggestions_system_prompt() -> &'static str {
    "You suggest bedtime stories a child is likely to enjoy tonight, based on what you remember \
about them. For each suggestion explain your reasoning so a parent can see why it was chosen. \
Return JSON matching the schema."
}

/// User prompt for proactive story suggestions
pub fn suggestions_prompt(memories: &[MemoryRecord], limit: usize) -> String {
    let mut prompt = format!("Suggest up to {limit} stories.\n");
    if memories.is_empty() {
        prompt.push_str("Nothing is known about the child yet; suggest gentle classics.\n");
    } else {
        prompt.push_str("What we remember:\n");
        for memory in memories {
            prompt.push_str(&format!("- {}\n", memory.content));
        }
    }
    prompt
}

/// Schema of the suggestions response
pub fn suggestions_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "suggestions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": {"type": "string"},
                        "theme": {"type": "string"},
                        "reasoning": {"type": "string"},
                        "confidence": {"type": "number"}
                    },
                    "required": ["title", "theme", "reasoning", "confidence"]
                }
            }
        },
        "required": ["suggestions"]
    })
}

/// Precomputed safe reply used by FALLBACK plans
pub fn fallback_reply(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Idle | SessionPhase::Onboarding => {
            "Hello, little one. Let's get cosy and get ready for a story."
        }
        SessionPhase::Storytelling => {
            "And so the little boat drifted gently along the quiet river, under a sky full of stars."
        }
        SessionPhase::Reflection => "What a lovely story that was. What was your favourite part?",
        SessionPhase::WindDown => "Let's take a slow, deep breath together. In... and out.",
        SessionPhase::Asleep => asleep_reply(),
    }
}

/// Reduced-risk reply used while in safe mode
pub fn safe_mode_reply(phase: SessionPhase) -> &'static str {
    match phase {
        SessionPhase::Asleep => asleep_reply(),
        _ => "Let's pause the story for a moment and just rest. Breathe in slowly... and out.",
    }
}

/// Whispered reply for a sleeping child
pub fn asleep_reply() -> &'static str {
    "Shh... sweet dreams. Goodnight."
}

/// Reply when the turn could not be served at all
pub fn abort_reply() -> &'static str {
    "I'm sorry, I lost my place in the story. Let's try again in a moment."
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdk::types::MemoryKind;

    fn memory(content: &str, role: &str) -> MemoryRecord {
        MemoryRecord {
            id: "m".to_string(),
            content: content.to_string(),
            kind: MemoryKind::Episodic,
            user_id: "u1".to_string(),
            session_id: Some("s1".to_string()),
            metadata: json!({ "role": role }),
            created_at: 0,
        }
    }

    #[test]
    fn test_indexed_transcript() {
        let transcript = indexed_transcript(&[memory("I love owls", "user"), memory("Owls are wise", "assistant")]);
        assert_eq!(transcript, "[0] user: I love owls\n[1] assistant: Owls are wise");
    }

    #[test]
    fn test_strict_prompt_adds_suffix() {
        assert!(conductor_system_prompt(true).contains("Output ONLY the JSON object"));
        assert!(!conductor_system_prompt(false).contains("could not be parsed"));
    }

    #[test]
    fn test_turn_prompt_includes_story_beat() {
        let mut state = SessionState::new("s1", "u1");
        state.transition_to(SessionPhase::Onboarding).unwrap();
        state.transition_to(SessionPhase::Storytelling).unwrap();
        state.set_context("storyBeat", json!(1));
        state.set_context("totalBeats", json!(5));
        state.set_context("lastReply", json!("Once upon a time"));

        let prompt = turn_prompt(&state, "and then?", Intent::AskQuestion, false);
        assert!(prompt.contains("Story beat: 2 of 5"));
        assert!(prompt.contains("Once upon a time"));

        let truncated = turn_prompt(&state, "and then?", Intent::AskQuestion, true);
        assert!(!truncated.contains("Once upon a time"));
    }

    #[test]
    fn test_schemas_name_required_fields() {
        assert_eq!(fact_extraction_schema()["properties"]["facts"]["items"]["required"][2], "lineReference");
        assert_eq!(verification_schema()["required"][0], "approved");
    }
}
