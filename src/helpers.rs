use unicode_normalization::UnicodeNormalization;

/// Normalize a string for fuzzy matching: lowercase + ASCII alphanumeric only.
pub fn normalize_key(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// Canonical form of a user utterance.
///
/// NFKC folds full-width digits and compatibility characters, typographic
/// quotes and dashes become ASCII, and whitespace runs collapse to one space.
pub fn normalize_utterance(text: &str) -> String {
    let folded: String = text
        .nfkc()
        .map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201B}' => '\'',
            '\u{201C}' | '\u{201D}' | '\u{201F}' => '"',
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Upper-case the first character.
pub fn capitalize_first(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Drop a leading article ("the", "a", "an").
pub fn strip_article(value: &str) -> &str {
    let trimmed = value.trim();
    for article in ["the ", "a ", "an "] {
        if trimmed.len() > article.len() && trimmed[..article.len()].eq_ignore_ascii_case(article) {
            return trimmed[article.len()..].trim_start();
        }
    }
    trimmed
}

/// First `max_words` words, with an ellipsis when something was cut.
pub fn first_words(value: &str, max_words: usize) -> String {
    let words: Vec<&str> = value.split_whitespace().collect();
    if words.len() <= max_words {
        words.join(" ")
    } else {
        format!("{}...", words[..max_words].join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_key_strips_punctuation() {
        assert_eq!(normalize_key("Budget Review (Q3)"), "budgetreviewq3");
    }

    #[test]
    fn utterances_fold_compatibility_forms() {
        assert_eq!(
            normalize_utterance("Meet  at \u{FF12}pm \u{201C}Sync\u{201D} \u{2014} it\u{2019}s fine"),
            "Meet at 2pm \"Sync\" - it's fine"
        );
    }

    #[test]
    fn articles_and_capitals() {
        assert_eq!(strip_article("the budget review"), "budget review");
        assert_eq!(strip_article("Anchor"), "Anchor");
        assert_eq!(capitalize_first("roadmap"), "Roadmap");
        assert_eq!(first_words("one two three four", 2), "one two...");
        assert_eq!(first_words("one two", 5), "one two");
    }
}
