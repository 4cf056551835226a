//! Rendering of sentence snapshots into display / spoken text.

/// Pure, stateless transform from a word sequence to text.
pub trait SentenceFormatter {
    fn format(&self, words: &[String]) -> String;
}

/// Sentence-case rendering:
///
/// - words joined by single spaces (blank words dropped);
/// - standalone `i` becomes `I`, and `i'…` contractions become `I'…`;
/// - first letter upper-cased, the rest left as announced;
/// - a trailing period appended unless one is already present.
#[derive(Debug, Clone, Copy, Default)]
pub struct SentenceCase;

impl SentenceFormatter for SentenceCase {
    fn format(&self, words: &[String]) -> String {
        let mut out = String::new();
        for word in words.iter().map(|w| w.trim()).filter(|w| !w.is_empty()) {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&capitalize_pronoun(word));
        }
        if out.is_empty() {
            return out;
        }
        if !out.ends_with('.') {
            out.push('.');
        }
        capitalize_first(&out)
    }
}

/// Plain space-joined words, no punctuation or casing changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainJoin;

impl SentenceFormatter for PlainJoin {
    fn format(&self, words: &[String]) -> String {
        words
            .iter()
            .map(|w| w.trim())
            .filter(|w| !w.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn capitalize_pronoun(word: &str) -> String {
    if word == "i" {
        return "I".to_string();
    }
    match word.strip_prefix("i'") {
        Some(rest) => format!("I'{rest}"),
        None => word.to_string(),
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
