//! Intent classification
//!
//! Maps free text to a small, fixed intent vocabulary with ordered regex
//! patterns; the first matching pattern wins. Sleep cues are detected
//! separately because they override the agenda regardless of intent.

use regex::Regex;
use sdk::session::ActiveIntent;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse intent of a user utterance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    Direct,
    AskQuestion,
    Affirm,
    Deny,
    Interrupt,
    Unknown,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Direct => "DIRECT",
            Intent::AskQuestion => "ASK_QUESTION",
            Intent::Affirm => "AFFIRM",
            Intent::Deny => "DENY",
            Intent::Interrupt => "INTERRUPT",
            Intent::Unknown => "UNKNOWN",
        }
    }

    /// Conversational stance the agent adopts in response
    pub fn active_intent(&self) -> ActiveIntent {
        match self {
            Intent::Interrupt => ActiveIntent::Interrupt,
            _ => ActiveIntent::Listen,
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ordered pattern classifier
pub struct IntentClassifier {
    patterns: Vec<(Intent, Regex)>,
    sleep_cue: Regex,
    negation: Regex,
}

impl IntentClassifier {
    /// Build the classifier from its fixed pattern table
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern fails to compile.
    pub fn new() -> anyhow::Result<Self> {
        let patterns = vec![
            (
                Intent::Interrupt,
                Regex::new(r"(?i)^\s*(wait|stop|hold on|hang on|hey|excuse me)\b")?,
            ),
            (
                Intent::AskQuestion,
                Regex::new(
                    r"(?i)(\?\s*$|^\s*(what|why|how|who|where|when|which|is|are|can|could|do|does|will|would)\b)",
                )?,
            ),
            (
                Intent::Affirm,
                Regex::new(r"(?i)^\s*(yes|yeah|yep|yup|ok|okay|sure|alright|please do|uh-huh)\b")?,
            ),
            (
                Intent::Deny,
                Regex::new(r"(?i)^\s*(no|nope|nah|not really|don'?t|never mind)\b")?,
            ),
            (
                Intent::Direct,
                Regex::new(
                    r"(?i)^\s*(tell|let'?s|make|give|read|sing|show|start|continue|i want|i'?d like)\b",
                )?,
            ),
        ];

        let sleep_cue = Regex::new(
            r"(?i)\b(sleepy|so tired|i'?m tired|good ?night|night night|falling asleep|can'?t keep my eyes open|want to sleep|yawn(s|ing)?)\b",
        )?;

        let negation = Regex::new(r"(?i)\b(not|no|never|nope|dont|cant|wont|isnt|aint)\b|n['’]t\b")?;

        Ok(Self {
            patterns,
            sleep_cue,
            negation,
        })
    }

    /// Classify an utterance; first matching pattern wins
    pub fn classify(&self, text: &str) -> Intent {
        self.patterns
            .iter()
            .find(|(_, pattern)| pattern.is_match(text))
            .map(|(intent, _)| *intent)
            .unwrap_or(Intent::Unknown)
    }

    /// Whether the utterance signals the user is falling asleep
    ///
    /// A cue counts only when nothing earlier in its clause negates it, so
    /// "I'm not sleepy!" keeps the story going.
    pub fn detect_sleep_cue(&self, text: &str) -> bool {
        text.split(['.', '!', '?', ',', ';'])
            .any(|clause| {
                self.sleep_cue
                    .find_iter(clause)
                    .any(|cue| !self.negation.is_match(&clause[..cue.start()]))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> IntentClassifier {
        IntentClassifier::new().unwrap()
    }

    #[test]
    fn test_vocabulary() {
        let c = classifier();
        assert_eq!(c.classify("Tell me about the moon"), Intent::Direct);
        assert_eq!(c.classify("Why is the owl awake?"), Intent::AskQuestion);
        assert_eq!(c.classify("yes please"), Intent::Affirm);
        assert_eq!(c.classify("nope"), Intent::Deny);
        assert_eq!(c.classify("wait, go back"), Intent::Interrupt);
        assert_eq!(c.classify("purple elephants"), Intent::Unknown);
    }

    #[test]
    fn test_first_match_wins() {
        let c = classifier();
        // Interrupt is checked before the trailing question mark
        assert_eq!(c.classify("stop, what was that?"), Intent::Interrupt);
        // A trailing question mark is checked before affirmations
        assert_eq!(c.classify("ok, can we go on?"), Intent::AskQuestion);
    }

    #[test]
    fn test_word_boundaries() {
        let c = classifier();
        assert_eq!(c.classify("nobody knows"), Intent::Unknown);
        assert_eq!(c.classify("heyday"), Intent::Unknown);
    }

    #[test]
    fn test_sleep_cues() {
        let c = classifier();
        assert!(c.detect_sleep_cue("I'm so sleepy"));
        assert!(c.detect_sleep_cue("goodnight mommy"));
        assert!(c.detect_sleep_cue("*yawns*"));
        assert!(!c.detect_sleep_cue("tell me about the sleeping dragon"));
        assert!(c.detect_sleep_cue("I can't keep my eyes open"));
    }

    #[test]
    fn test_negated_sleep_cues_are_ignored() {
        let c = classifier();
        assert!(!c.detect_sleep_cue("I'm not sleepy! Tell me a story"));
        assert!(!c.detect_sleep_cue("I am NOT tired"));
        assert!(!c.detect_sleep_cue("I don't want to sleep"));
        assert!(!c.detect_sleep_cue("never say goodnight"));
        assert!(!c.detect_sleep_cue("Im not sleepy"));
        // A later clause can still carry the cue
        assert!(c.detect_sleep_cue("not yet, okay goodnight"));
        assert!(c.detect_sleep_cue("I want to sleep now"));
        assert!(c.detect_sleep_cue("I want you to say goodnight"));
    }

    #[test]
    fn test_active_intent_mapping() {
        assert_eq!(Intent::Interrupt.active_intent(), ActiveIntent::Interrupt);
        assert_eq!(Intent::AskQuestion.active_intent(), ActiveIntent::Listen);
    }
}
