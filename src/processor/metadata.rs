//! Inline task priority.
//!
//! Recognises `P1`/`P2`/`P3`, "high priority", "urgent", "asap" and "low
//! priority" in task text, and strips them from a task title.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::types::Priority;

fn re_priority_code() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(P[123])\b").unwrap())
}

fn re_priority_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:[-,(]\s*)?\b(?:(high|top|urgent|low|medium|normal)[- ]priority|(urgent(?:ly)?|asap|as soon as possible))\b\)?").unwrap()
    })
}

fn priority_from_word(word: &str) -> Priority {
    match word.to_lowercase().as_str() {
        "low" => Priority::P3,
        "medium" | "normal" => Priority::P2,
        _ => Priority::P1,
    }
}

/// Find the first priority marker and the range it occupies.
pub fn find_priority(text: &str) -> Option<(Range<usize>, Priority)> {
    let code = re_priority_code().captures(text).and_then(|caps| {
        let whole = caps.get(0)?;
        let priority = match caps[1].to_uppercase().as_str() {
            "P1" => Priority::P1,
            "P3" => Priority::P3,
            _ => Priority::P2,
        };
        Some((whole.range(), priority))
    });
    let words = re_priority_words().captures(text).and_then(|caps| {
        let whole = caps.get(0)?;
        let word = caps.get(1).or_else(|| caps.get(2))?;
        Some((whole.range(), priority_from_word(word.as_str())))
    });

    match (code, words) {
        (Some(a), Some(b)) => Some(if a.0.start <= b.0.start { a } else { b }),
        (a, b) => a.or(b),
    }
}

/// `text` without its priority markers, whitespace collapsed.
pub fn strip_priority(text: &str) -> String {
    let clean = re_priority_code().replace_all(text, "");
    let clean = re_priority_words().replace_all(&clean, "");
    clean.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_codes() {
        let (_, priority) = find_priority("P1 Follow up on renewal").unwrap();
        assert_eq!(priority, Priority::P1);
        assert_eq!(strip_priority("P1 Follow up on renewal"), "Follow up on renewal");
        assert_eq!(strip_priority("Draft pricing p2"), "Draft pricing");
    }

    #[test]
    fn priority_words() {
        let (_, priority) = find_priority("Review quarterly budget - high priority").unwrap();
        assert_eq!(priority, Priority::P1);
        assert_eq!(strip_priority("Review quarterly budget - high priority"), "Review quarterly budget");

        let (_, priority) = find_priority("Tidy the shared drive (low priority)").unwrap();
        assert_eq!(priority, Priority::P3);
        assert_eq!(strip_priority("Tidy the shared drive (low priority)"), "Tidy the shared drive");
    }

    #[test]
    fn urgent_is_high() {
        let (_, priority) = find_priority("call the bank urgently").unwrap();
        assert_eq!(priority, Priority::P1);
        assert_eq!(strip_priority("call the bank urgently"), "call the bank");
    }

    #[test]
    fn plain_titles_are_untouched() {
        assert!(find_priority("Send weekly update email").is_none());
        assert_eq!(strip_priority("Send  weekly update email"), "Send weekly update email");
        assert_eq!(strip_priority("Book #offsite venue"), "Book #offsite venue");
        assert_eq!(strip_priority(""), "");
    }

    #[test]
    fn span_points_at_the_token() {
        let text = "file expenses P3";
        let (span, priority) = find_priority(text).unwrap();
        assert_eq!(&text[span], "P3");
        assert_eq!(priority, Priority::P3);
    }
}
