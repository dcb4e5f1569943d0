//! Routing keys and topic-exchange pattern matching.

/// Fixed routing keys, one per event category.
pub mod routing_keys {
    pub const PRICE_CHANGE_DETECTED: &str = "price.change.detected";
    pub const USER_CREATED: &str = "user.created";
}

/// Topic-exchange matching: words are `.`-separated, `*` matches exactly one
/// word and `#` matches zero or more words.
pub fn topic_matches(pattern: &str, key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = key.split('.').collect();
    matches_words(&pattern, &key)
}

fn matches_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| matches_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&k, key_rest)) if word == "*" || word == k => matches_words(rest, key_rest),
            _ => false,
        },
    }
}
