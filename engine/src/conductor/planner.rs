//! Session Planner
//!
//! Maps a requested duration class to a fixed, ordered agenda. Pure and
//! infallible: the agenda drives phase transitions, the beat count drives
//! consolidation at the end of the story.

use sdk::session::SessionPhase;
use serde::{Deserialize, Serialize};

use super::types::SessionDuration;

/// One agenda entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgendaItem {
    pub phase: SessionPhase,
    pub goal: String,
    pub estimated_minutes: u32,
}

impl AgendaItem {
    fn new(phase: SessionPhase, goal: &str, estimated_minutes: u32) -> Self {
        Self {
            phase,
            goal: goal.to_string(),
            estimated_minutes,
        }
    }
}

pub struct SessionPlanner;

impl SessionPlanner {
    /// Ordered agenda for a session of the given duration
    pub fn plan(duration: SessionDuration) -> Vec<AgendaItem> {
        use SessionPhase::*;

        match duration {
            SessionDuration::Short => vec![
                AgendaItem::new(Onboarding, "Greet the child and pick a story theme", 1),
                AgendaItem::new(Storytelling, "Tell a short calming story", 5),
                AgendaItem::new(WindDown, "Guide a slow breathing wind-down", 2),
            ],
            SessionDuration::Medium => vec![
                AgendaItem::new(Onboarding, "Greet the child and ask about their day", 2),
                AgendaItem::new(Storytelling, "Tell an interactive story", 10),
                AgendaItem::new(Reflection, "Reflect on the story's gentle lesson", 2),
                AgendaItem::new(WindDown, "Guide a slow breathing wind-down", 3),
            ],
            SessionDuration::Long => vec![
                AgendaItem::new(Onboarding, "Greet the child and ask about their day", 3),
                AgendaItem::new(Storytelling, "Co-create a story with the child's choices", 15),
                AgendaItem::new(Reflection, "Talk about favourite moments of the story", 4),
                AgendaItem::new(WindDown, "Guided relaxation and goodnight wishes", 5),
            ],
        }
    }

    /// Number of story beats told during STORYTELLING
    pub fn story_beats(duration: SessionDuration) -> u32 {
        match duration {
            SessionDuration::Short => 3,
            SessionDuration::Medium => 5,
            SessionDuration::Long => 8,
        }
    }

    /// Total estimated minutes of an agenda
    pub fn estimated_minutes(agenda: &[AgendaItem]) -> u32 {
        agenda.iter().map(|item| item.estimated_minutes).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agendas_follow_the_phase_machine() {
        for duration in [
            SessionDuration::Short,
            SessionDuration::Medium,
            SessionDuration::Long,
        ] {
            let agenda = SessionPlanner::plan(duration);
            assert_eq!(agenda[0].phase, SessionPhase::Onboarding);
            assert_eq!(agenda.last().map(|i| i.phase), Some(SessionPhase::WindDown));

            let mut phase = SessionPhase::Idle;
            for item in &agenda {
                assert!(phase.can_transition_to(item.phase));
                phase = item.phase;
            }
        }
    }

    #[test]
    fn test_longer_sessions_take_longer() {
        let short = SessionPlanner::estimated_minutes(&SessionPlanner::plan(SessionDuration::Short));
        let long = SessionPlanner::estimated_minutes(&SessionPlanner::plan(SessionDuration::Long));
        assert!(long > short);
        assert_eq!(SessionPlanner::story_beats(SessionDuration::Medium), 5);
    }

    #[test]
    fn test_short_sessions_skip_reflection() {
        let agenda = SessionPlanner::plan(SessionDuration::Short);
        assert!(agenda.iter().all(|i| i.phase != SessionPhase::Reflection));
    }
}
