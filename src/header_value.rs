//! Tokenizer for comma-separated header values
//!
//! Splits a raw header such as `gzip;q=0.5, "deflate, x"` into ordered
//! tokens. Double-quoted sections are opaque: commas and semicolons inside
//! them never split. A trailing `;q=<value>` clause is lifted into
//! [`HeaderToken::qvalue`] only when `<value>` is `0`, `1`, `0.d` or `1.d`;
//! any other tail stays in the identity verbatim, so `gzip;q==0.5` yields a
//! single identity `gzip;q==0.5` with no qvalue.

/// One token of a header value
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderToken {
    /// Token text with surrounding whitespace removed; casing and quotes kept
    pub identity: String,
    /// Quality value, when a well-formed `q=` clause was present
    pub qvalue: Option<f32>,
}

impl HeaderToken {
    pub fn new(identity: impl Into<String>, qvalue: Option<f32>) -> Self {
        HeaderToken {
            identity: identity.into(),
            qvalue,
        }
    }

    /// Whether the client marked this token as acceptable (no qvalue or q > 0)
    pub fn is_acceptable(&self) -> bool {
        self.qvalue.map_or(true, |q| q > 0.0)
    }
}

/// Parser for list-valued headers
pub struct HeaderValueParser;

impl HeaderValueParser {
    /// Parse a header into tokens with optional quality values
    ///
    /// Empty identities are dropped, including a bare `;q=1`.
    pub fn parse(raw: &str) -> Vec<HeaderToken> {
        split_outside_quotes(raw, b',')
            .into_iter()
            .filter_map(|token| {
                let (identity, qvalue) = split_qvalue(token);
                let identity = identity.trim();
                if identity.is_empty() {
                    None
                } else {
                    Some(HeaderToken::new(identity, qvalue))
                }
            })
            .collect()
    }

    /// Parse a header into bare identities, without qvalue handling
    ///
    /// Used for entity-tag lists (`If-Match`, `If-None-Match`), where a
    /// semicolon has no special meaning.
    pub fn parse_identities(raw: &str) -> Vec<&str> {
        split_outside_quotes(raw, b',')
            .into_iter()
            .map(str::trim)
            .filter(|identity| !identity.is_empty())
            .collect()
    }
}

// Split on `delimiter` wherever it occurs outside double quotes.
// An unterminated quote runs to the end of the input.
fn split_outside_quotes(raw: &str, delimiter: u8) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;

    for (i, b) in raw.bytes().enumerate() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == delimiter && !in_quotes {
            pieces.push(&raw[start..i]);
            start = i + 1;
        }
    }
    pieces.push(&raw[start..]);
    pieces
}

// Position of the last `;` outside double quotes.
fn last_unquoted_semicolon(token: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut found = None;
    for (i, b) in token.bytes().enumerate() {
        if b == b'"' {
            in_quotes = !in_quotes;
        } else if b == b';' && !in_quotes {
            found = Some(i);
        }
    }
    found
}

fn split_qvalue(token: &str) -> (&str, Option<f32>) {
    let Some(pos) = last_unquoted_semicolon(token) else {
        return (token, None);
    };

    match parse_q_clause(&token[pos + 1..]) {
        Some(q) => (&token[..pos], Some(q)),
        None => (token, None),
    }
}

// Accepts `\s*[qQ]\s*=\s*[01](\.\d)?\s*` and nothing else.
fn parse_q_clause(clause: &str) -> Option<f32> {
    let rest = clause.trim_start();
    let rest = rest
        .strip_prefix('q')
        .or_else(|| rest.strip_prefix('Q'))?
        .trim_start();
    let value = rest.strip_prefix('=')?.trim();

    let bytes = value.as_bytes();
    let well_formed = match bytes {
        [b'0' | b'1'] => true,
        [b'0' | b'1', b'.', d] => d.is_ascii_digit(),
        _ => false,
    };
    if !well_formed {
        return None;
    }
    value.parse::<f32>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_list() {
        let tokens = HeaderValueParser::parse("gzip, deflate");
        assert_eq!(
            tokens,
            vec![HeaderToken::new("gzip", None), HeaderToken::new("deflate", None)]
        );
    }

    #[test]
    fn test_qvalues_with_whitespace() {
        let tokens = HeaderValueParser::parse("gzip ; Q = 0.5,deflate;q=1, br;q=0");
        assert_eq!(tokens[0], HeaderToken::new("gzip", Some(0.5)));
        assert_eq!(tokens[1], HeaderToken::new("deflate", Some(1.0)));
        assert_eq!(tokens[2], HeaderToken::new("br", Some(0.0)));
        assert!(!tokens[2].is_acceptable());
    }

    #[test]
    fn test_quoted_token_keeps_commas() {
        let tokens = HeaderValueParser::parse("gzip;q=0.5, \"deflate, x\"");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], HeaderToken::new("gzip", Some(0.5)));
        assert_eq!(tokens[1], HeaderToken::new("\"deflate, x\"", None));
    }

    #[test]
    fn test_malformed_qvalue_folds_into_identity() {
        let cases = [
            ("gzip;q==0.5", "gzip;q==0.5"),
            ("gzip;q=abc", "gzip;q=abc"),
            ("gzip;q=10", "gzip;q=10"),
            ("gzip;q=0.55", "gzip;q=0.55"),
            ("gzip;q=0.", "gzip;q=0."),
            ("gzip;x=0.5", "gzip;x=0.5"),
        ];
        for (raw, identity) in cases {
            let tokens = HeaderValueParser::parse(raw);
            assert_eq!(tokens, vec![HeaderToken::new(identity, None)], "input {raw}");
        }
    }

    #[test]
    fn test_empty_identities_dropped() {
        let tokens = HeaderValueParser::parse(" , gzip,, ;q=0.5 ,");
        assert_eq!(tokens, vec![HeaderToken::new("gzip", None)]);
        assert!(HeaderValueParser::parse("").is_empty());
    }

    #[test]
    fn test_casing_preserved() {
        let tokens = HeaderValueParser::parse("GZip;q=0.3");
        assert_eq!(tokens[0].identity, "GZip");
    }

    #[test]
    fn test_parse_identities() {
        let tags = HeaderValueParser::parse_identities("\"a,b\", \"c\" ,, W/\"d\"");
        assert_eq!(tags, vec!["\"a,b\"", "\"c\"", "W/\"d\""]);
    }

    #[test]
    fn test_semicolon_inside_quotes_is_not_a_clause() {
        let tokens = HeaderValueParser::parse("\"x;q=0.5\"");
        assert_eq!(tokens, vec![HeaderToken::new("\"x;q=0.5\"", None)]);
    }
}
