//! Token helpers shared by the query builder and the scorer

/// Split on whitespace and separator punctuation, dropping empty tokens.
pub fn tokenize(text: &str) -> Vec<&str> {
    text.split(is_separator).filter(|t| !t.is_empty()).collect()
}

fn is_separator(c: char) -> bool {
    c.is_whitespace()
        || matches!(
            c,
            ',' | ';'
                | ':'
                | '/'
                | '\\'
                | '|'
                | '('
                | ')'
                | '['
                | ']'
                | '{'
                | '}'
                | '<'
                | '>'
                | '"'
                | '\''
                | '_'
                | '-'
                | '.'
                | '!'
                | '?'
                | '·'
                | '、'
                | '。'
        )
}

/// Lowercased tokens, first occurrence kept, at least two characters long
pub fn lexical_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(text) {
        if token.chars().count() < 2 {
            continue;
        }
        let lowered = token.to_lowercase();
        if !terms.contains(&lowered) {
            terms.push(lowered);
        }
    }
    terms
}

/// Collapse runs of whitespace and trim
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
