//! Response shaping for full, single-range and multipart entity bodies
//!
//! An [`EntityResponse`] is chosen once per request from the parsed `Range`
//! header and never changes afterwards. Sending happens in two steps:
//! [`EntityResponse::send_headers`] validates the negotiated coding against
//! the stored entity and fills the response headers, returning a
//! [`PreparedResponse`] that carries exactly the decisions the body must
//! honour; [`PreparedResponse::send_body`] then writes the body.

use crate::compression::{BodyEncoder, DEFAULT_COMPRESSION_LEVEL};
use crate::error::{DeliveryError, Result};
use crate::headers::ProducedHeader;
use crate::models::{CompressionType, EntityInfo, HttpMethod, RangeItem};
use crate::range_parser::RangeOutcome;
use crate::transmission::TransmissionStrategy;
use http::{HeaderMap, HeaderValue};
use std::io::Write;
use tracing::{debug, warn};

/// Boundary separating the parts of a `multipart/byteranges` body
pub const MULTIPART_BOUNDARY: &str = "3d6b6a416f9b5d2c8e1f0a7b";

/// Response shape for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityResponse {
    /// The whole entity, `200 OK`
    Full,
    /// One byte range, `206 Partial Content`
    SinglePart(RangeItem),
    /// Two or more byte ranges framed as `multipart/byteranges`
    MultiPart(Vec<RangeItem>),
}

impl EntityResponse {
    /// Pick the variant for a parsed `Range` header
    ///
    /// No ranges (including an unsatisfiable header) selects `Full`; the
    /// caller decides separately whether to answer 416 instead.
    pub fn select(outcome: RangeOutcome) -> Self {
        match outcome {
            RangeOutcome::Satisfiable(mut ranges) => match ranges.len() {
                0 => EntityResponse::Full,
                1 => EntityResponse::SinglePart(ranges.remove(0)),
                _ => EntityResponse::MultiPart(ranges),
            },
            RangeOutcome::Unknown | RangeOutcome::Unsatisfiable => EntityResponse::Full,
        }
    }

    pub fn is_partial(&self) -> bool {
        !matches!(self, EntityResponse::Full)
    }

    fn name(&self) -> &'static str {
        match self {
            EntityResponse::Full => "full",
            EntityResponse::SinglePart(_) => "single-part",
            EntityResponse::MultiPart(_) => "multipart",
        }
    }

    /// Fill the entity headers for this response
    ///
    /// # Errors
    /// * `UnsupportedRecompression` - a full response of a stored-compressed
    ///   entity was requested in a different coding
    /// * `CompressedRange` - a range of a stored-compressed entity was requested
    /// * `InvalidHeader` - the entity's content type is not a valid header value
    pub fn send_headers(
        self,
        compression: CompressionType,
        entity: &EntityInfo,
        headers: &mut HeaderMap,
    ) -> Result<PreparedResponse> {
        debug!(
            "Building {} response headers: entity_length={}, stored={}, requested={}",
            self.name(),
            entity.content_length,
            entity.compression,
            compression
        );

        let wire_encoding = match &self {
            EntityResponse::Full => {
                if entity.compression.is_compressed() && entity.compression != compression {
                    warn!(
                        "Refusing to recompress {} entity as {}",
                        entity.compression, compression
                    );
                    return Err(DeliveryError::UnsupportedRecompression {
                        stored: entity.compression,
                        requested: compression,
                    });
                }
                if entity.compression == compression {
                    CompressionType::None
                } else {
                    compression
                }
            }
            EntityResponse::SinglePart(_) | EntityResponse::MultiPart(_) => {
                if entity.compression.is_compressed() {
                    warn!("Refusing byte ranges of {} entity", entity.compression);
                    return Err(DeliveryError::CompressedRange(entity.compression));
                }
                compression
            }
        };

        // Every fallible value is built before the map is touched
        let entity_type = header_value(ProducedHeader::ContentType, &entity.content_type)?;
        let (content_type, content_range) = match &self {
            EntityResponse::Full => (entity_type, None),
            EntityResponse::SinglePart(range) => (
                entity_type,
                Some(header_value(
                    ProducedHeader::ContentRange,
                    &range.content_range(entity.content_length),
                )?),
            ),
            EntityResponse::MultiPart(_) => (
                header_value(
                    ProducedHeader::ContentType,
                    &format!("multipart/byteranges; boundary={}", MULTIPART_BOUNDARY),
                )?,
                None,
            ),
        };

        if let Some(token) = compression.content_encoding() {
            headers.insert(
                ProducedHeader::ContentEncoding.name(),
                HeaderValue::from_static(token),
            );
        }

        let identity_length = match &self {
            EntityResponse::Full => entity.content_length,
            EntityResponse::SinglePart(range) => range.len(),
            EntityResponse::MultiPart(ranges) => multipart_length(
                ranges,
                &entity.content_type,
                entity.content_length,
                MULTIPART_BOUNDARY,
            ),
        };
        // On-the-fly encoding makes the length unknown; the body goes chunked
        let content_length = if wire_encoding.is_compressed() {
            headers.remove(ProducedHeader::ContentLength.name());
            None
        } else {
            headers.insert(
                ProducedHeader::ContentLength.name(),
                HeaderValue::from(identity_length),
            );
            Some(identity_length)
        };

        headers.insert(ProducedHeader::ContentType.name(), content_type);
        if let Some(content_range) = content_range {
            headers.insert(ProducedHeader::ContentRange.name(), content_range);
        }

        if !entity.compression.is_compressed() {
            headers.insert(
                ProducedHeader::AcceptRanges.name(),
                HeaderValue::from_static("bytes"),
            );
        }

        debug!(
            "Built {} response headers: content_length={:?}, wire_encoding={}",
            self.name(),
            content_length,
            wire_encoding
        );

        Ok(PreparedResponse {
            response: self,
            wire_encoding,
            content_type: entity.content_type.clone(),
            entity_length: entity.content_length,
            content_length,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        })
    }

    /// Check the method, then send headers and body in one go
    ///
    /// Unlike calling the two phases separately, a method other than GET or
    /// HEAD is rejected before any header is touched.
    pub fn respond<W: Write>(
        self,
        method: HttpMethod,
        compression: CompressionType,
        entity: &EntityInfo,
        headers: &mut HeaderMap,
        out: W,
        strategy: &mut dyn TransmissionStrategy,
    ) -> Result<u64> {
        ensure_body_method(method)?;
        self.send_headers(compression, entity, headers)?
            .send_body(method, out, strategy)
    }
}

/// Headers sent; holds what the body transmission must honour
#[derive(Debug, Clone)]
pub struct PreparedResponse {
    response: EntityResponse,
    wire_encoding: CompressionType,
    content_type: String,
    entity_length: u64,
    content_length: Option<u64>,
    compression_level: u32,
}

impl PreparedResponse {
    /// Set the level used when the body is encoded on the fly
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level;
        self
    }

    pub fn response(&self) -> &EntityResponse {
        &self.response
    }

    /// `Content-Length` that was announced, `None` for a chunked body
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Encoder applied while writing the body (identity for pass-through)
    pub fn wire_encoding(&self) -> CompressionType {
        self.wire_encoding
    }

    /// Write the response body
    ///
    /// `HEAD` writes nothing and never touches `strategy`. `GET` streams the
    /// body and returns the number of entity and framing bytes produced
    /// before any on-the-fly encoding.
    ///
    /// # Errors
    /// * `UnsupportedMethod` - any method other than GET or HEAD, raised
    ///   before anything is written
    /// * I/O, timeout and cancellation errors from the strategy or writer
    pub fn send_body<W: Write>(
        &self,
        method: HttpMethod,
        out: W,
        strategy: &mut dyn TransmissionStrategy,
    ) -> Result<u64> {
        ensure_body_method(method)?;
        if method == HttpMethod::Head {
            debug!("HEAD request, skipping {} body", self.response.name());
            return Ok(0);
        }

        if strategy.len() != self.entity_length {
            return Err(DeliveryError::IoError(format!(
                "transmission source holds {} bytes, entity declares {}",
                strategy.len(),
                self.entity_length
            )));
        }

        let mut encoder = BodyEncoder::new(out, self.wire_encoding, self.compression_level);
        let written = match &self.response {
            EntityResponse::Full => strategy.transmit_all(&mut encoder)?,
            EntityResponse::SinglePart(range) => {
                strategy.transmit_range(&mut encoder, range.start, range.len())?
            }
            EntityResponse::MultiPart(ranges) => {
                let mut written = 0;
                for range in ranges {
                    let part_header = multipart_part_header(
                        MULTIPART_BOUNDARY,
                        &self.content_type,
                        range,
                        self.entity_length,
                    );
                    encoder.write_all(part_header.as_bytes())?;
                    written += part_header.len() as u64;
                    written += strategy.transmit_range(&mut encoder, range.start, range.len())?;
                    strategy.complete(&mut encoder)?;
                }
                let footer = multipart_footer(MULTIPART_BOUNDARY);
                encoder.write_all(footer.as_bytes())?;
                written + footer.len() as u64
            }
        };
        encoder.finish()?;

        debug!(
            "Sent {} body: {} bytes before encoding ({})",
            self.response.name(),
            written,
            self.wire_encoding
        );
        Ok(written)
    }
}

fn ensure_body_method(method: HttpMethod) -> Result<()> {
    if method.is_body_method() {
        Ok(())
    } else {
        warn!("Rejecting entity body for method {}", method);
        Err(DeliveryError::UnsupportedMethod(method))
    }
}

fn header_value(header: ProducedHeader, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| {
        DeliveryError::InvalidHeader(format!("{} {:?}: {}", header.name(), value, e))
    })
}

/// Framing written before each part of a multipart body
pub fn multipart_part_header(
    boundary: &str,
    content_type: &str,
    range: &RangeItem,
    entity_length: u64,
) -> String {
    format!(
        "\r\n--{}\r\nContent-Type: {}\r\nContent-Range: {}\r\n\r\n",
        boundary,
        content_type,
        range.content_range(entity_length)
    )
}

/// Closing delimiter of a multipart body
pub fn multipart_footer(boundary: &str) -> String {
    format!("\r\n--{}--\r\n", boundary)
}

/// Exact byte length of a multipart body: every part header plus its range
/// payload, plus the closing delimiter
pub fn multipart_length(
    ranges: &[RangeItem],
    content_type: &str,
    entity_length: u64,
    boundary: &str,
) -> u64 {
    let parts: u64 = ranges
        .iter()
        .map(|range| {
            multipart_part_header(boundary, content_type, range, entity_length).len() as u64
                + range.len()
        })
        .sum();
    parts + multipart_footer(boundary).len() as u64
}
