//! Small tokenizer for metric expressions.
//!
//! Metric expressions are scalar SQL over measure names. We never parse them
//! into a tree; we only need to find the bare identifiers that stand for
//! measures and swap each for an aggregated column reference, leaving
//! literals, function names and keywords alone.

use crate::dialect::is_reserved;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Ident(&'a str),
    /// Backtick or double-quote delimited identifier, delimiters included.
    QuotedIdent(&'a str),
    Number(&'a str),
    /// Single-quoted string literal, quotes included.
    Str(&'a str),
    Whitespace(&'a str),
    Symbol(&'a str),
}

impl<'a> Token<'a> {
    pub fn text(&self) -> &'a str {
        match self {
            Token::Ident(s)
            | Token::QuotedIdent(s)
            | Token::Number(s)
            | Token::Str(s)
            | Token::Whitespace(s)
            | Token::Symbol(s) => s,
        }
    }
}

/// Words that may appear bare in an expression without naming a measure.
const EXPRESSION_WORDS: &[&str] = &[
    "ILIKE", "SAFE_CAST", "INT64", "INTEGER", "INT", "BIGINT", "FLOAT64", "FLOAT", "DOUBLE",
    "NUMERIC", "BIGNUMERIC", "DECIMAL", "STRING", "VARCHAR", "BOOL", "BOOLEAN", "DATETIME",
    "TIMESTAMP", "DAY", "WEEK", "MONTH", "QUARTER", "YEAR", "HOUR", "MINUTE", "SECOND",
];

pub fn is_keyword(word: &str) -> bool {
    is_reserved(word) || EXPRESSION_WORDS.iter().any(|w| w.eq_ignore_ascii_case(word))
}

/// Split an expression into tokens. Concatenating every token's text gives
/// back the input unchanged.
pub fn tokenize(input: &str) -> Result<Vec<Token<'_>>, String> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        let token = if c.is_ascii_whitespace() {
            while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
                pos += 1;
            }
            Token::Whitespace(&input[start..pos])
        } else if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len() && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_') {
                pos += 1;
            }
            Token::Ident(&input[start..pos])
        } else if c.is_ascii_digit() {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            pos = exponent_end(bytes, pos);
            Token::Number(&input[start..pos])
        } else if c == b'\'' {
            pos = closing(bytes, pos, b'\'')
                .ok_or_else(|| format!("unterminated string literal at offset {start}"))?;
            Token::Str(&input[start..pos])
        } else if c == b'`' || c == b'"' {
            pos = closing(bytes, pos, c)
                .ok_or_else(|| format!("unterminated quoted identifier at offset {start}"))?;
            Token::QuotedIdent(&input[start..pos])
        } else {
            // Keep multi-byte characters whole.
            let width = input[start..].chars().next().map_or(1, char::len_utf8);
            pos += width;
            Token::Symbol(&input[start..pos])
        };
        tokens.push(token);
    }

    Ok(tokens)
}

/// End of an `e`/`E` exponent (`1e3`, `2.5E-4`) starting at `pos`, or `pos`
/// itself when no digits follow.
fn exponent_end(bytes: &[u8], pos: usize) -> usize {
    if !matches!(bytes.get(pos), Some(b'e' | b'E')) {
        return pos;
    }
    let mut end = pos + 1;
    if matches!(bytes.get(end), Some(b'+' | b'-')) {
        end += 1;
    }
    let digits = bytes[end..].iter().take_while(|b| b.is_ascii_digit()).count();
    if digits == 0 {
        return pos;
    }
    end + digits
}

/// Index one past the closing delimiter; doubled delimiters and backslash escapes are skipped.
fn closing(bytes: &[u8], open: usize, delim: u8) -> Option<usize> {
    let mut pos = open + 1;
    while pos < bytes.len() {
        match bytes[pos] {
            b'\\' => pos += 2,
            b if b == delim => {
                if bytes.get(pos + 1) == Some(&delim) {
                    pos += 2;
                } else {
                    return Some(pos + 1);
                }
            }
            _ => pos += 1,
        }
    }
    None
}

/// Identifiers that refer to columns: not keywords, not function names
/// (followed by `(`), and not part of a dotted path.
pub fn column_references<'a>(tokens: &[Token<'a>]) -> Vec<(usize, &'a str)> {
    let significant: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !matches!(t, Token::Whitespace(_)))
        .map(|(i, _)| i)
        .collect();

    let mut refs = Vec::new();
    for (pos, &idx) in significant.iter().enumerate() {
        let Token::Ident(word) = tokens[idx] else {
            continue;
        };
        if is_keyword(word) {
            continue;
        }
        let next = significant.get(pos + 1).map(|&i| tokens[i].text());
        let prev = pos
            .checked_sub(1)
            .and_then(|p| significant.get(p))
            .map(|&i| tokens[i].text());
        if next == Some("(") || next == Some(".") || prev == Some(".") {
            continue;
        }
        refs.push((idx, word));
    }
    refs
}

/// Rebuild the tokenized text with every column reference passed through `rewrite`.
pub fn rewrite_references<E, F>(tokens: &[Token<'_>], mut rewrite: F) -> Result<String, E>
where
    F: FnMut(&str) -> Result<String, E>,
{
    let refs = column_references(tokens);
    let mut out = String::new();
    let mut next_ref = refs.iter().peekable();
    for (idx, token) in tokens.iter().enumerate() {
        match next_ref.peek() {
            Some((ref_idx, word)) if *ref_idx == idx => {
                out.push_str(&rewrite(*word)?);
                next_ref.next();
            }
            _ => out.push_str(token.text()),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_round_trip_text() {
        let input = "SUM(x) / NULLIF(y, 0) * 1.5 + 'a''b'";
        let tokens = tokenize(input).unwrap();
        let rebuilt: String = tokens.iter().map(Token::text).collect();
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn finds_bare_identifiers_only() {
        let tokens =
            tokenize("SAFE_DIVIDE(clicks, impressions) + CAST(cost AS FLOAT64) - t.col").unwrap();
        let refs: Vec<&str> = column_references(&tokens).into_iter().map(|(_, w)| w).collect();
        assert_eq!(refs, vec!["clicks", "impressions", "cost"]);
    }

    #[test]
    fn string_literals_are_opaque() {
        let tokens = tokenize("CASE WHEN status = 'revenue' THEN 1 ELSE 0 END").unwrap();
        let refs: Vec<&str> = column_references(&tokens).into_iter().map(|(_, w)| w).collect();
        assert_eq!(refs, vec!["status"]);
    }

    #[test]
    fn exponents_stay_inside_numbers() {
        let tokens = tokenize("revenue * 1e3 - cost / 2.5E-4").unwrap();
        let numbers: Vec<&str> = tokens
            .iter()
            .filter_map(|t| match t {
                Token::Number(n) => Some(*n),
                _ => None,
            })
            .collect();
        assert_eq!(numbers, vec!["1e3", "2.5E-4"]);
        let refs: Vec<&str> = column_references(&tokens).into_iter().map(|(_, w)| w).collect();
        assert_eq!(refs, vec!["revenue", "cost"]);

        // No digits after the `e`: the letter starts an identifier.
        let tokens = tokenize("2e").unwrap();
        assert_eq!(tokens, vec![Token::Number("2"), Token::Ident("e")]);
    }

    #[test]
    fn unterminated_literal_is_an_error() {
        assert!(tokenize("revenue * 'oops").is_err());
        assert!(tokenize("`revenue").is_err());
    }

    #[test]
    fn rewrites_references() {
        let tokens = tokenize("(revenue - cost) / revenue").unwrap();
        let out: Result<String, String> =
            rewrite_references(&tokens, |w| Ok(format!("SUM({w})")));
        assert_eq!(out.unwrap(), "(SUM(revenue) - SUM(cost)) / SUM(revenue)");

        let tokens = tokenize("revenue + mystery").unwrap();
        let err: Result<String, String> = rewrite_references(&tokens, |w| match w {
            "revenue" => Ok("SUM(revenue)".to_string()),
            other => Err(format!("unknown {other}")),
        });
        assert_eq!(err.unwrap_err(), "unknown mystery");
    }
}
