#![allow(dead_code)]

use doctags::{Bindings, Token, TokenKind, Value, tokenize};

/// Tokenize `input` and assert the token spans tile it exactly.
pub fn tokens_covering(input: &str) -> Vec<Token> {
    let tokens = tokenize(input).expect("tokenize failed");
    assert_coverage(input, &tokens);
    tokens
}

/// Token spans must be contiguous, start at 0, end at `input.len()`,
/// and concatenate back to `input`.
pub fn assert_coverage(input: &str, tokens: &[Token]) {
    assert!(!tokens.is_empty(), "no tokens for {input:?}");
    assert_eq!(tokens[0].start, 0, "first token does not start at 0");
    for pair in tokens.windows(2) {
        assert_eq!(
            pair[0].end, pair[1].start,
            "gap or overlap between {:?} and {:?}",
            pair[0], pair[1]
        );
    }
    assert_eq!(tokens[tokens.len() - 1].end, input.len());

    let rebuilt: String = tokens.iter().map(|t| t.span(input)).collect();
    assert_eq!(rebuilt, input, "token spans do not rebuild the input");
}

/// Text contents in order, empty runs included.
pub fn texts(tokens: &[Token]) -> Vec<&str> {
    tokens
        .iter()
        .filter_map(|t| match &t.kind {
            TokenKind::Text { content } => Some(content.as_str()),
            _ => None,
        })
        .collect()
}

pub fn bindings<const N: usize>(pairs: [(&str, Value); N]) -> Bindings {
    pairs
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}
