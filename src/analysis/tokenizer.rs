use std::collections::BTreeMap;

/// Splits `text` into normalized tokens: maximal runs of non-whitespace,
/// ASCII-lowercased, with ASCII punctuation removed. Tokens that end up
/// empty are dropped. Non-ASCII bytes pass through untouched.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_ascii_whitespace()
        .filter_map(|word| {
            let token: String = word
                .chars()
                .filter(|c| !c.is_ascii_punctuation())
                .map(|c| c.to_ascii_lowercase())
                .collect();
            if token.is_empty() {
                None
            } else {
                Some(token)
            }
        })
        .collect()
}

/// Token counts for `text`, accumulating repeated tokens additively.
pub fn term_frequencies(text: &str) -> BTreeMap<String, i32> {
    let mut freq = BTreeMap::new();
    for token in tokenize(text) {
        *freq.entry(token).or_insert(0) += 1;
    }
    freq
}

/// Normalizes a user-supplied keyword list: comma- or whitespace-separated,
/// each keyword run through the same pipeline as document text.
pub fn parse_keywords(input: &str) -> Vec<String> {
    tokenize(&input.replace(',', " "))
}
