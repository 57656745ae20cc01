use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Anything that looks like a link worth rewriting
static LINK_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"(t\.me/|https?://)").unwrap());

static LINK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:https?://|t\.me/)[\w\-._~:/?#\[\]@!$&'()*+,;=]+").unwrap()
});

pub fn has_links(text: &str) -> bool {
    LINK_MARKER.is_match(text)
}

/// All t.me and http(s) links in `text`, in order of appearance
pub fn extract_links(text: &str) -> Vec<&str> {
    LINK.find_iter(text).map(|m| m.as_str()).collect()
}

/// Replace every match of `pattern` with `new_link`
pub fn replace_links(text: &str, pattern: &Regex, new_link: &str) -> String {
    pattern.replace_all(text, regex::NoExpand(new_link)).into_owned()
}

/// Cut `text` to at most `max_chars` characters, ending with `suffix` when cut
pub fn truncate_text(text: &str, max_chars: usize, suffix: &str) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(suffix.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(suffix);
    out
}

pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Lowercased whitespace-separated words
pub fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(|w| w.to_lowercase()).collect()
}
