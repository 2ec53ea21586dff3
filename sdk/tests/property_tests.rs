use proptest::prelude::*;
use sdk::errors::{AiError, EngineError, SomnusErrorExt, StoreError};
use sdk::session::SessionState;
use serde_json::json;

// Every error variant carries a non-empty user hint that never echoes the raw detail
proptest! {
    #[test]
    fn test_error_user_hint_completeness(detail in "[a-z]{12,40}") {
        let hints: Vec<String> = vec![
            EngineError::Config(detail.clone()).user_hint().to_string(),
            EngineError::Database(detail.clone()).user_hint().to_string(),
            EngineError::LLMProvider(detail.clone()).user_hint().to_string(),
            AiError::Auth(detail.clone()).user_hint().to_string(),
            AiError::Schema(detail.clone()).user_hint().to_string(),
            AiError::Other(detail.clone()).user_hint().to_string(),
            StoreError::Backend(detail.clone()).user_hint().to_string(),
            StoreError::NotFound(detail.clone()).user_hint().to_string(),
        ];

        for hint in hints {
            prop_assert!(!hint.is_empty());
            prop_assert!(!hint.contains(&detail));
        }
    }
}

// Rolling back k of n recorded mutations lands on the state after n - k mutations
proptest! {
    #[test]
    fn test_rollback_matches_replay(n in 1usize..40, k in 0usize..40) {
        let k = k.min(n);
        let mut state = SessionState::new("s1", "u1").with_history_limit(64);
        let mut expected = SessionState::new("s1", "u1").with_history_limit(64);

        for i in 0..n {
            state.set_context("turn", json!(i));
        }
        for i in 0..(n - k) {
            expected.set_context("turn", json!(i));
        }

        let undone = state.rollback(k);

        prop_assert_eq!(undone, k);
        prop_assert_eq!(state.snapshot(), expected.snapshot());
        prop_assert_eq!(state.revision(), expected.revision());
    }
}

// History never exceeds its retention cap
proptest! {
    #[test]
    fn test_history_never_exceeds_cap(limit in 1usize..16, mutations in 0usize..64) {
        let mut state = SessionState::new("s1", "u1").with_history_limit(limit);
        for i in 0..mutations {
            state.set_context("turn", json!(i));
        }

        prop_assert!(state.history().len() <= limit);
        prop_assert_eq!(state.history().len(), mutations.min(limit));
    }
}
