//! Cheap heuristic that keeps trivial threads away from the LLM.

/// Outcome of the pre-filter check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreFilterDecision {
    pub interesting: bool,
    /// `"ok"` when interesting, otherwise the failing predicate,
    /// e.g. `message_count_1_lt_2`.
    pub reason: String,
}

/// Decide whether a thread is worth an LLM call.
#[must_use]
pub fn check(
    message_count: usize,
    total_chars: usize,
    min_messages: usize,
    min_chars: usize,
) -> PreFilterDecision {
    if message_count < min_messages {
        return PreFilterDecision {
            interesting: false,
            reason: format!("message_count_{message_count}_lt_{min_messages}"),
        };
    }
    if total_chars < min_chars {
        return PreFilterDecision {
            interesting: false,
            reason: format!("total_chars_{total_chars}_lt_{min_chars}"),
        };
    }
    PreFilterDecision { interesting: true, reason: "ok".to_owned() }
}

/// Convenience over a list of message texts.
#[must_use]
pub fn check_thread(texts: &[String], min_messages: usize, min_chars: usize) -> PreFilterDecision {
    let total_chars = texts.iter().map(String::len).sum();
    check(texts.len(), total_chars, min_messages, min_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_threshold_passes() {
        let d = check(2, 50, 2, 50);
        assert!(d.interesting);
        assert_eq!(d.reason, "ok");
    }

    #[test]
    fn below_message_threshold_encodes_reason() {
        let d = check(1, 500, 2, 50);
        assert!(!d.interesting);
        assert_eq!(d.reason, "message_count_1_lt_2");
    }

    #[test]
    fn below_char_threshold_encodes_reason() {
        let d = check(3, 49, 2, 50);
        assert!(!d.interesting);
        assert_eq!(d.reason, "total_chars_49_lt_50");
    }

    #[test]
    fn message_count_checked_before_chars() {
        let d = check(0, 0, 2, 50);
        assert_eq!(d.reason, "message_count_0_lt_2");
    }

    #[test]
    fn thread_helper_sums_lengths() {
        let texts = vec!["12345".to_owned(), "67890".to_owned()];
        assert!(check_thread(&texts, 2, 10).interesting);
        assert!(!check_thread(&texts, 2, 11).interesting);
    }
}
