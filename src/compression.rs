//! Content-coding negotiation and streaming encoders
//!
//! [`CompressionNegotiator`] turns an `Accept-Encoding` header into a single
//! [`CompressionType`]. [`BodyEncoder`] wraps a response writer with the
//! matching streaming encoder.

use crate::header_value::{HeaderToken, HeaderValueParser};
use crate::headers::ConsumedHeader;
use crate::models::CompressionType;
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use http::HeaderMap;
use std::cmp::Ordering;
use std::io::{self, Write};
use tracing::debug;

/// Default encoder level, matching zlib's default
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Picks a response coding from the client's `Accept-Encoding`
pub struct CompressionNegotiator;

impl CompressionNegotiator {
    /// Negotiate from the raw header value, `None` meaning the header is absent
    pub fn from_header(accept_encoding: Option<&str>) -> CompressionType {
        match accept_encoding {
            Some(raw) => Self::negotiate(&HeaderValueParser::parse(raw)),
            None => CompressionType::None,
        }
    }

    /// Negotiate straight from request headers
    pub fn from_headers(headers: &HeaderMap) -> CompressionType {
        Self::from_header(ConsumedHeader::AcceptEncoding.get(headers))
    }

    /// Negotiate from already parsed tokens
    ///
    /// Tokens are ranked by descending qvalue, a missing qvalue ranking above
    /// any explicit one, ties keeping header order. The first acceptable
    /// `deflate`, `gzip`, `x-gzip` or `*` wins. A winning `*` stands for
    /// "anything not named": `deflate` if the client never mentioned it, else
    /// `gzip` if neither gzip spelling was mentioned, else the best explicit
    /// acceptable coding.
    pub fn negotiate(tokens: &[HeaderToken]) -> CompressionType {
        if tokens.is_empty() {
            return CompressionType::None;
        }

        let mut ranked: Vec<&HeaderToken> = tokens.iter().collect();
        ranked.sort_by(|a, b| preference(a, b));

        let Some(selected) = first_acceptable(&ranked, true) else {
            debug!("No acceptable coding in Accept-Encoding, using identity");
            return CompressionType::None;
        };

        let decision = if selected.identity == "*" {
            let mentioned = |name: &str| {
                tokens
                    .iter()
                    .any(|t| t.identity.eq_ignore_ascii_case(name))
            };

            if !mentioned("deflate") {
                CompressionType::Deflate
            } else if !mentioned("gzip") && !mentioned("x-gzip") {
                CompressionType::GZip
            } else {
                first_acceptable(&ranked, false)
                    .and_then(|t| CompressionType::from_token(&t.identity))
                    .unwrap_or(CompressionType::None)
            }
        } else {
            CompressionType::from_token(&selected.identity).unwrap_or(CompressionType::None)
        };

        debug!(
            "Negotiated content coding: selected={:?}, decision={}",
            selected.identity, decision
        );
        decision
    }
}

// Missing qvalue outranks any explicit one; higher qvalues come first.
fn preference(a: &HeaderToken, b: &HeaderToken) -> Ordering {
    match (a.qvalue, b.qvalue) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
    }
}

fn is_supported_coding(identity: &str, allow_wildcard: bool) -> bool {
    identity.eq_ignore_ascii_case("deflate")
        || identity.eq_ignore_ascii_case("gzip")
        || identity.eq_ignore_ascii_case("x-gzip")
        || (allow_wildcard && identity == "*")
}

fn first_acceptable<'a>(ranked: &[&'a HeaderToken], allow_wildcard: bool) -> Option<&'a HeaderToken> {
    ranked
        .iter()
        .copied()
        .find(|t| is_supported_coding(&t.identity, allow_wildcard) && t.is_acceptable())
}

/// Response body writer applying the negotiated coding
///
/// `deflate` is written in the zlib container, the format HTTP defines for
/// that token.
pub enum BodyEncoder<W: Write> {
    Identity(W),
    GZip(GzEncoder<W>),
    Deflate(ZlibEncoder<W>),
}

impl<W: Write> BodyEncoder<W> {
    pub fn new(inner: W, compression: CompressionType, level: u32) -> Self {
        let level = Compression::new(level);
        match compression {
            CompressionType::None => BodyEncoder::Identity(inner),
            CompressionType::GZip => BodyEncoder::GZip(GzEncoder::new(inner, level)),
            CompressionType::Deflate => BodyEncoder::Deflate(ZlibEncoder::new(inner, level)),
        }
    }

    pub fn compression(&self) -> CompressionType {
        match self {
            BodyEncoder::Identity(_) => CompressionType::None,
            BodyEncoder::GZip(_) => CompressionType::GZip,
            BodyEncoder::Deflate(_) => CompressionType::Deflate,
        }
    }

    /// Write the encoder trailer and hand back the inner writer
    pub fn finish(self) -> io::Result<W> {
        match self {
            BodyEncoder::Identity(mut w) => {
                w.flush()?;
                Ok(w)
            }
            BodyEncoder::GZip(e) => e.finish(),
            BodyEncoder::Deflate(e) => e.finish(),
        }
    }
}

impl<W: Write> Write for BodyEncoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BodyEncoder::Identity(w) => w.write(buf),
            BodyEncoder::GZip(e) => e.write(buf),
            BodyEncoder::Deflate(e) => e.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BodyEncoder::Identity(w) => w.flush(),
            BodyEncoder::GZip(e) => e.flush(),
            BodyEncoder::Deflate(e) => e.flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::{GzDecoder, ZlibDecoder};
    use std::io::Read;

    fn negotiate(raw: &str) -> CompressionType {
        CompressionNegotiator::from_header(Some(raw))
    }

    #[test]
    fn test_absent_or_empty_header() {
        assert_eq!(CompressionNegotiator::from_header(None), CompressionType::None);
        assert_eq!(negotiate(""), CompressionType::None);
        assert_eq!(negotiate(" , "), CompressionType::None);
    }

    #[test]
    fn test_first_match_wins_without_qvalues() {
        assert_eq!(negotiate("gzip, deflate"), CompressionType::GZip);
        assert_eq!(negotiate("deflate, gzip"), CompressionType::Deflate);
        assert_eq!(negotiate("br, X-GZIP"), CompressionType::GZip);
    }

    #[test]
    fn test_qvalue_ordering() {
        assert_eq!(
            negotiate("deflate;q=0.5, gzip;q=0.9, compress"),
            CompressionType::GZip
        );
        assert_eq!(negotiate("gzip;q=0.1, deflate"), CompressionType::Deflate);
    }

    #[test]
    fn test_zero_qvalue_is_refusal() {
        assert_eq!(negotiate("gzip;q=0"), CompressionType::None);
        assert_eq!(negotiate("gzip;q=0, deflate;q=0.2"), CompressionType::Deflate);
    }

    #[test]
    fn test_wildcard_fallback() {
        assert_eq!(negotiate("*"), CompressionType::Deflate);
        assert_eq!(negotiate("*, gzip"), CompressionType::Deflate);
        assert_eq!(negotiate("*, deflate"), CompressionType::GZip);
        assert_eq!(negotiate("*, deflate;q=0"), CompressionType::GZip);
        assert_eq!(negotiate("*, deflate;q=0, gzip;q=0.4"), CompressionType::GZip);
        assert_eq!(negotiate("*, deflate;q=0.3, x-gzip;q=0.4"), CompressionType::GZip);
        assert_eq!(negotiate("*, deflate;q=0, gzip;q=0"), CompressionType::None);
        assert_eq!(negotiate("*;q=0"), CompressionType::None);
    }

    #[test]
    fn test_encoder_round_trip_gzip() {
        let mut encoder = BodyEncoder::new(Vec::new(), CompressionType::GZip, 6);
        encoder.write_all(b"hello hello hello").unwrap();
        let compressed = encoder.finish().unwrap();
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut decoded = String::new();
        GzDecoder::new(&compressed[..]).read_to_string(&mut decoded).unwrap();
        assert_eq!(decoded, "hello hello hello");
    }

    #[test]
    fn test_encoder_round_trip_deflate() {
        let mut encoder = BodyEncoder::new(Vec::new(), CompressionType::Deflate, 6);
        assert_eq!(encoder.compression(), CompressionType::Deflate);
        encoder.write_all(b"abcabcabc").unwrap();
        let compressed = encoder.finish().unwrap();

        let mut decoded = Vec::new();
        ZlibDecoder::new(&compressed[..]).read_to_end(&mut decoded).unwrap();
        assert_eq!(decoded, b"abcabcabc");
    }

    #[test]
    fn test_identity_encoder_passes_through() {
        let mut encoder = BodyEncoder::new(Vec::new(), CompressionType::None, 6);
        encoder.write_all(b"raw").unwrap();
        assert_eq!(encoder.finish().unwrap(), b"raw");
    }
}
