//! People mentioned in an utterance: email addresses, names after "with" or
//! "to", and resolution of names against the address book.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Jaro-Winkler score above which a name is taken to be a contact.
const CONTACT_MATCH_THRESHOLD: f64 = 0.92;

/// A person to invite or write to. `email` is `None` until resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attendee {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl Attendee {
    pub fn email(address: impl Into<String>) -> Self {
        Self {
            name: None,
            email: Some(address.into()),
        }
    }

    pub fn unresolved(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.email.is_some()
    }

    /// Name if known, otherwise the address.
    pub fn display(&self) -> &str {
        self.name
            .as_deref()
            .or(self.email.as_deref())
            .unwrap_or("someone")
    }
}

fn re_email() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9-]+(?:\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}\b").unwrap()
    })
}

fn re_at_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\s,;<>()]*@[^\s,;<>()]*").unwrap())
}

fn re_with() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(?:with|invite|inviting|including)\s+").unwrap())
}

fn re_to() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:to|e-?mail|message|ping|cc)\s+").unwrap()
    })
}

fn re_separator() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\s*(?:,|&|\+|\band\b)\s*").unwrap())
}

/// Words that end a list of names.
const STOP_WORDS: &[&str] = &[
    "about", "regarding", "re", "on", "at", "in", "for", "from", "by", "to", "tomorrow",
    "today", "tonight", "next", "this", "called", "titled", "named", "saying", "that",
    "telling", "asking", "via", "who", "subject", "body", "message", "email", "mail",
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday", "between",
    "until", "till", "please", "so", "if", "when", "because", "the", "a", "an", "my",
];

/// Pronouns that never name another person.
const NOT_PEOPLE: &[&str] = &["me", "us", "myself", "him", "her", "them", "everyone", "it"];

/// Every well-formed email address with its range.
pub fn find_emails(text: &str) -> Vec<(Range<usize>, String)> {
    re_email()
        .find_iter(text)
        .map(|m| (m.range(), m.as_str().to_lowercase()))
        .collect()
}

/// Tokens that contain `@` but are not valid addresses.
pub fn malformed_addresses(text: &str) -> Vec<(Range<usize>, String)> {
    let valid = find_emails(text);
    re_at_token()
        .find_iter(text)
        .filter(|m| {
            let token = m.as_str().trim_end_matches(['.', '!', '?', ':']);
            // a lone "@" is shorthand for "at"
            token != "@"
                && !valid
                    .iter()
                    .any(|(r, _)| r.start <= m.start() && m.start() + token.len() <= r.end)
        })
        .map(|m| (m.range(), m.as_str().to_string()))
        .collect()
}

/// Names listed after "with"/"invite".
///
/// The list stops at a stop word, at sentence punctuation, or at the first
/// byte already claimed by another extractor. Emails inside the list are
/// skipped here because `find_emails` reports them.
pub fn names_after_with(text: &str, occupied: &[Range<usize>]) -> Option<(Range<usize>, Vec<String>)> {
    names_after(re_with(), text, occupied)
}

/// Names after "to"/"email"; used for recipients.
pub fn names_after_to(text: &str, occupied: &[Range<usize>]) -> Option<(Range<usize>, Vec<String>)> {
    names_after(re_to(), text, occupied)
}

fn names_after(
    trigger: &Regex,
    text: &str,
    occupied: &[Range<usize>],
) -> Option<(Range<usize>, Vec<String>)> {
    for m in trigger.find_iter(text) {
        let start = m.end();
        let end = clause_end(text, start, occupied);
        let names = split_names(&text[start..end]);
        if !names.is_empty() {
            return Some((m.start()..end, names));
        }
    }
    None
}

/// End of a run of names starting at `start`.
fn clause_end(text: &str, start: usize, occupied: &[Range<usize>]) -> usize {
    let hard_stop = occupied
        .iter()
        .filter(|r| r.start >= start)
        .map(|r| r.start)
        .min()
        .unwrap_or(text.len());
    let hard_stop = text[start..hard_stop]
        .find(['.', '?', '!', ';', ':', '"', '\n'])
        .map(|i| start + i)
        .unwrap_or(hard_stop);

    // Walk word by word; a stop word ends the clause. An email in an occupied
    // range is allowed to sit inside the list, so only non-email ranges stop it.
    let mut end = start;
    let mut offset = start;
    for word in text[start..hard_stop].split_inclusive(char::is_whitespace) {
        let bare = word
            .trim()
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();
        if STOP_WORDS.contains(&bare.as_str()) && !is_separator_word(&bare) {
            break;
        }
        offset += word.len();
        end = offset;
    }
    let clause = &text[start..end];
    start + clause.trim_end().len()
}

fn is_separator_word(word: &str) -> bool {
    word == "and"
}

pub(crate) fn split_names(clause: &str) -> Vec<String> {
    re_separator()
        .split(clause)
        .map(|part| part.trim().trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|part| !part.is_empty())
        .filter(|part| !part.contains('@'))
        .filter(|part| !NOT_PEOPLE.contains(&part.to_lowercase().as_str()))
        .filter(|part| part.split_whitespace().count() <= 4)
        .map(title_case)
        .collect()
}

fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Look a name up in the address book.
///
/// Exact (case-insensitive) matches on the full name or first name win;
/// otherwise the closest Jaro-Winkler match above the threshold.
pub fn resolve_contact(name: &str, contacts: &BTreeMap<String, String>) -> Option<String> {
    let wanted = name.trim().to_lowercase();
    if wanted.is_empty() {
        return None;
    }

    for (contact, address) in contacts {
        let contact_lower = contact.to_lowercase();
        let first = contact_lower.split_whitespace().next().unwrap_or("");
        if contact_lower == wanted || first == wanted {
            return Some(address.clone());
        }
    }

    contacts
        .iter()
        .map(|(contact, address)| {
            let score = strsim::jaro_winkler(&contact.to_lowercase(), &wanted);
            (score, address)
        })
        .filter(|(score, _)| *score >= CONTACT_MATCH_THRESHOLD)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, address)| address.clone())
}

/// Try to fill in addresses for unresolved attendees.
pub fn resolve_all(people: &mut [Attendee], contacts: &BTreeMap<String, String>) {
    for person in people.iter_mut().filter(|p| !p.is_resolved()) {
        if let Some(name) = person.name.as_deref() {
            person.email = resolve_contact(name, contacts);
        }
    }
}
