//! Deterministic field parsers applied to free-text chat messages. Pure
//! functions of the input text; the language-model fallbacks live in
//! `services::ai::extraction` and are invoked by the dialogue router only
//! after these parsers miss.

use chrono::NaiveDate;
use regex::Regex;

/// Tokens that never count as a person's name during the heuristic scan.
const STOP_WORDS: &[&str] = &[
    "the", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by", "from", "up",
    "about", "into", "through", "during", "before", "after", "above", "below", "between", "among",
    "this", "that", "these", "those", "i", "you", "he", "she", "it", "we", "they", "me", "him",
    "her", "us", "them", "my", "your", "his", "its", "our", "their", "like", "want", "need",
    "book", "cancel", "schedule", "appointment", "doctor", "please", "hello",
];

/// Short replies that acknowledge a prompt without carrying a name.
const ACKNOWLEDGEMENTS: &[&str] = &[
    "okay", "ok", "sure", "yes", "no", "yeah", "yep", "alright", "fine",
];

pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(&word.to_lowercase().as_str())
}

pub fn is_acknowledgement(text: &str) -> bool {
    ACKNOWLEDGEMENTS.contains(&text.trim().to_lowercase().as_str())
}

/// Name extraction: introduction patterns first, then a scan for two
/// adjacent capitalized tokens. Returns the first name and, when present,
/// the last name. Misses return None so the caller can continue down its
/// fallback chain.
pub fn extract_name(text: &str) -> Option<(String, Option<String>)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    let patterns = [
        r"(?i)\b(?:i am|i'm)\s+([A-Za-z]{2,})(?:\s+([A-Za-z]{2,}))?",
        r"(?i)\bmy name is\s+([A-Za-z]{2,})(?:\s+([A-Za-z]{2,}))?",
        r"(?i)\bthis is\s+([A-Za-z]{2,})(?:\s+([A-Za-z]{2,}))?",
    ];
    for pattern in patterns {
        let re = Regex::new(pattern).unwrap();
        if let Some(caps) = re.captures(text) {
            let first = caps.get(1).map(|m| m.as_str().to_string());
            if let Some(first) = first.filter(|f| !is_stop_word(f)) {
                let last = caps
                    .get(2)
                    .map(|m| m.as_str().to_string())
                    .filter(|l| !is_stop_word(l));
                return Some((first, last));
            }
        }
    }

    // Two adjacent capitalized words that are not common words.
    let tokens: Vec<&str> = text
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphabetic()))
        .collect();
    for window in tokens.windows(2) {
        let (a, b) = (window[0], window[1]);
        if looks_like_name(a) && looks_like_name(b) && !is_stop_word(a) && !is_stop_word(b) {
            return Some((a.to_string(), Some(b.to_string())));
        }
    }

    None
}

fn looks_like_name(word: &str) -> bool {
    word.len() >= 2
        && word.chars().next().is_some_and(|c| c.is_uppercase())
        && word.chars().all(|c| c.is_alphabetic())
}

/// Normalize common calendar-date spellings to ISO `YYYY-MM-DD`. Returns
/// None when no format matches; callers keep the raw string in that case.
pub fn normalize_date(text: &str) -> Option<String> {
    const FORMATS: &[&str] = &["%m/%d/%Y", "%m-%d-%Y", "%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];
    let text = text.trim();
    for fmt in FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Pull a standard-shaped email address out of the message, if any.
pub fn extract_email(text: &str) -> Option<String> {
    let re = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    re.find(text).map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_name_introduction_patterns() {
        assert_eq!(
            extract_name("I am John Doe"),
            Some(("John".to_string(), Some("Doe".to_string())))
        );
        assert_eq!(
            extract_name("my name is Sarah"),
            Some(("Sarah".to_string(), None))
        );
        assert_eq!(
            extract_name("Hi, this is Jane Smith speaking"),
            Some(("Jane".to_string(), Some("Smith".to_string())))
        );
    }

    #[test]
    fn test_extract_name_adjacent_capitalized_tokens() {
        assert_eq!(
            extract_name("Maria Gonzalez"),
            Some(("Maria".to_string(), Some("Gonzalez".to_string())))
        );
        // Punctuation around tokens is stripped before matching.
        assert_eq!(
            extract_name("It's Maria Gonzalez."),
            Some(("Maria".to_string(), Some("Gonzalez".to_string())))
        );
    }

    #[test]
    fn test_extract_name_misses() {
        assert_eq!(extract_name("i want to book an appointment"), None);
        assert_eq!(extract_name("okay"), None);
        assert_eq!(extract_name(""), None);
        // Stop words never become names even when capitalized.
        assert_eq!(extract_name("Book Appointment"), None);
    }

    #[test]
    fn test_acknowledgements() {
        assert!(is_acknowledgement("okay"));
        assert!(is_acknowledgement(" Yes "));
        assert!(!is_acknowledgement("John"));
    }

    #[test]
    fn test_normalize_date_formats() {
        assert_eq!(normalize_date("03/15/1985"), Some("1985-03-15".to_string()));
        assert_eq!(normalize_date("03-15-1985"), Some("1985-03-15".to_string()));
        assert_eq!(normalize_date("1985-03-15"), Some("1985-03-15".to_string()));
        // Day-first spellings are reached once month-first fails.
        assert_eq!(normalize_date("15/03/1985"), Some("1985-03-15".to_string()));
        assert_eq!(normalize_date("not a date"), None);
    }

    #[test]
    fn test_extract_email() {
        assert_eq!(
            extract_email("my email is john.doe@example.com thanks"),
            Some("john.doe@example.com".to_string())
        );
        assert_eq!(extract_email("no address here"), None);
    }
}
