//! Glob-style key patterns, as understood by `KEYS`-like scans.
//!
//! Supported syntax:
//! - `*` matches any run of characters (including none)
//! - `?` matches exactly one character
//! - `[abc]`, `[a-z]`, `[^a]` match one character from (or not from) a set
//! - `\x` matches `x` literally

use crate::error::{StoreError, StoreResult};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Token {
    Literal(char),
    AnyRun,
    AnyOne,
    Class { negated: bool, ranges: Vec<(char, char)> },
}

impl Token {
    fn matches_one(&self, ch: char) -> bool {
        match self {
            Self::Literal(c) => *c == ch,
            Self::AnyOne => true,
            Self::Class { negated, ranges } => {
                let hit = ranges.iter().any(|(lo, hi)| *lo <= ch && ch <= *hi);
                hit != *negated
            }
            Self::AnyRun => false,
        }
    }
}

/// A compiled key pattern.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KeyPattern {
    source: String,
    tokens: Vec<Token>,
}

impl KeyPattern {
    /// Compile a pattern. Fails on an unterminated `[` class.
    pub fn parse(pattern: &str) -> StoreResult<Self> {
        let mut tokens = Vec::new();
        let mut chars = pattern.chars().peekable();

        while let Some(ch) = chars.next() {
            match ch {
                '*' => {
                    // Consecutive stars are equivalent to one.
                    if tokens.last() != Some(&Token::AnyRun) {
                        tokens.push(Token::AnyRun);
                    }
                }
                '?' => tokens.push(Token::AnyOne),
                '\\' => tokens.push(Token::Literal(chars.next().unwrap_or('\\'))),
                '[' => {
                    let negated = chars.next_if(|c| *c == '^').is_some();
                    let mut ranges = Vec::new();
                    let mut closed = false;
                    while let Some(c) = chars.next() {
                        let lo = match c {
                            ']' => {
                                closed = true;
                                break;
                            }
                            '\\' => chars.next().unwrap_or('\\'),
                            other => other,
                        };
                        let hi = if chars.peek() == Some(&'-') {
                            chars.next();
                            match chars.next() {
                                Some('\\') => chars.next().unwrap_or('\\'),
                                Some(']') | None => {
                                    // Trailing '-' is literal.
                                    ranges.push((lo, lo));
                                    ranges.push(('-', '-'));
                                    closed = true;
                                    break;
                                }
                                Some(h) => h,
                            }
                        } else {
                            lo
                        };
                        ranges.push(if lo <= hi { (lo, hi) } else { (hi, lo) });
                    }
                    if !closed {
                        return Err(StoreError::InvalidPattern {
                            pattern: pattern.to_string(),
                            reason: "unterminated character class".into(),
                        });
                    }
                    tokens.push(Token::Class { negated, ranges });
                }
                other => tokens.push(Token::Literal(other)),
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            tokens,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Test whether `key` matches the whole pattern.
    pub fn matches(&self, key: &str) -> bool {
        let text: Vec<char> = key.chars().collect();
        let (mut t, mut p) = (0usize, 0usize);
        // Position of the last `*` seen and the text index it resumed from.
        let mut backtrack: Option<(usize, usize)> = None;

        while t < text.len() {
            match self.tokens.get(p) {
                Some(Token::AnyRun) => {
                    backtrack = Some((p, t));
                    p += 1;
                }
                Some(tok) if tok.matches_one(text[t]) => {
                    t += 1;
                    p += 1;
                }
                _ => match backtrack {
                    Some((star, resume)) => {
                        p = star + 1;
                        t = resume + 1;
                        backtrack = Some((star, resume + 1));
                    }
                    None => return false,
                },
            }
        }

        self.tokens[p..].iter().all(|tok| *tok == Token::AnyRun)
    }
}
