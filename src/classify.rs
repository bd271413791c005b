use once_cell::sync::Lazy;
use regex::Regex;

/// Whether a query needs vector retrieval at all.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryClass {
    /// Greeting / small talk. Answered without touching the index.
    General,
    /// Information-seeking. Worth an embedding + vector lookup.
    Specific,
}

static GENERAL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)^hello\b",
        r"(?i)^hi\b",
        r"(?i)^hey\b",
        r"(?i)^greetings\b",
        r"(?i)how are you",
        r"(?i)what's up",
        r"(?i)good (morning|afternoon|evening)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("invalid greeting pattern"))
    .collect()
});

/// Classify a user query. Pure and total: no input panics, no I/O.
///
/// Empty or whitespace-only input is treated as `General` so it never
/// triggers a pointless retrieval round trip.
pub fn classify(query: &str) -> QueryClass {
    if query.trim().is_empty() {
        return QueryClass::General;
    }

    if GENERAL_PATTERNS.iter().any(|re| re.is_match(query)) {
        QueryClass::General
    } else {
        QueryClass::Specific
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greetings_are_general() {
        for query in [
            "hello",
            "Hello there!",
            "hi",
            "HI THERE",
            "hey, quick question",
            "greetings",
            "so, how are you today?",
            "what's up",
            "good morning",
            "Good Afternoon",
            "good evening everyone",
        ] {
            assert_eq!(classify(query), QueryClass::General, "query: {}", query);
        }
    }

    #[test]
    fn information_seeking_is_specific() {
        for query in [
            "What is the average salary for a backend developer in Austin?",
            "which cities hire the most data engineers",
            "history of hiring freezes in big tech",
            "highest paying roles for juniors",
            "remote work trends in 2024",
            "tell me about demand for Rust developers",
        ] {
            assert_eq!(classify(query), QueryClass::Specific, "query: {}", query);
        }
    }

    #[test]
    fn empty_input_is_general_and_never_panics() {
        assert_eq!(classify(""), QueryClass::General);
        assert_eq!(classify("   "), QueryClass::General);
        assert_eq!(classify("\n\t"), QueryClass::General);
    }
}
