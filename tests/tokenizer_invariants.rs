//! Token-stream invariants from spec.md §8 that sit below the tree-builder layer:
//! every token's span is well-formed (#2), and consecutive `Character` emissions are
//! never split when nothing else was emitted in between (#3).

use markup_core::{StringSource, Token, Tokenizer};

fn tokenize(input: &str) -> Vec<Token> {
    let mut tokenizer = Tokenizer::new(StringSource::new(input), false);
    let mut tokens = Vec::new();
    loop {
        match tokenizer.next_token().unwrap() {
            Some(Token::Eof) | None => break,
            Some(tok) => {
                let is_eof = matches!(tok, Token::Eof);
                tokens.push(tok);
                if is_eof {
                    break;
                }
            }
        }
    }
    tokens
}

#[test]
fn every_token_span_is_well_formed_and_in_bounds() {
    let input = "<p>One <b>Two</b> Three</p>";
    let tokens = tokenize(input);
    assert!(!tokens.is_empty());
    for tok in &tokens {
        if let Some(span) = tok.span() {
            assert!(span.start <= span.end, "span {span:?} has start after end");
            assert!(span.end <= input.chars().count(), "span {span:?} runs past input length");
        }
    }
}

#[test]
fn consecutive_character_tokens_are_never_split() {
    // "One " and "Two" both land in Data state with nothing else emitted between
    // them (no markup, no entity that would end the token early) — the tokenizer
    // must coalesce them into one Character token, not two back-to-back ones.
    let tokens = tokenize("One Two Three");
    let character_tokens: Vec<_> = tokens
        .iter()
        .filter(|t| matches!(t, Token::Character(_, _)))
        .collect();
    assert_eq!(character_tokens.len(), 1, "expected a single coalesced Character token, got {character_tokens:?}");
    if let Token::Character(c, _) = character_tokens[0] {
        assert_eq!(c.data, "One Two Three");
    }
}
