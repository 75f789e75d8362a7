//! Entity Delivery
//!
//! HTTP entity delivery primitives: decide how a stored entity should be sent
//! for a given request and write the matching response headers and body.
//!
//! # Overview
//!
//! Given the request headers and metadata about one stored entity (length,
//! content type, stored coding, validators), the crate answers three
//! questions and then performs the transfer:
//!
//! - Which content coding should the response use? ([`CompressionNegotiator`])
//! - Do the conditional headers allow the response? ([`ConditionalRequest`])
//! - Which byte ranges were asked for? ([`RangeParser`])
//!
//! The answers select an [`EntityResponse`]: the full entity, one range, or a
//! `multipart/byteranges` body. Entity bytes come from a pluggable
//! [`TransmissionStrategy`] so the same response logic serves memory, files
//! and memory maps.
//!
//! # Features
//!
//! - **Quote-aware header parsing**: list headers with optional `q` weights
//! - **Content negotiation**: gzip and deflate, with pass-through of entities
//!   stored pre-compressed
//! - **Strict range validation**: malformed or out-of-bounds ranges are never
//!   clamped
//! - **Exact multipart framing**: `Content-Length` always matches the bytes
//!   written
//! - **Bounded transmission**: buffered copies with deadlines and cancellation
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use entity_delivery::{
//!     BytesTransmission, CompressionNegotiator, EntityInfo, EntityResponse, HttpMethod,
//!     RangeParser,
//! };
//! use http::HeaderMap;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let body = b"Hello, world!".to_vec();
//! let entity = EntityInfo::new(body.len() as u64, "text/plain");
//!
//! let mut request = HeaderMap::new();
//! request.insert("range", "bytes=0-4".parse()?);
//!
//! let compression = CompressionNegotiator::from_headers(&request);
//! let ranges = RangeParser::from_headers(&request, entity.content_length);
//!
//! let mut response_headers = HeaderMap::new();
//! let mut out = Vec::new();
//! EntityResponse::select(ranges).respond(
//!     HttpMethod::Get,
//!     compression,
//!     &entity,
//!     &mut response_headers,
//!     &mut out,
//!     &mut BytesTransmission::new(body),
//! )?;
//! assert_eq!(out, b"Hello");
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! Transmission tunables are loaded from a YAML file:
//!
//! ```yaml
//! buffer_size: 65536            # 64KB copy buffer
//! compression_level: 6          # gzip/deflate level
//! transmit_timeout_ms: 30000    # per-response deadline
//! mmap_threshold: 65536         # memory-map files from 64KB
//! file_open_retries: 3
//! file_open_retry_delay_ms: 50
//! ```
//!
//! See [`DeliveryConfig`] for details.
//!
//! # Error Handling
//!
//! All fallible operations return [`DeliveryError`]:
//!
//! ```rust,no_run
//! use entity_delivery::{DeliveryConfig, DeliveryError};
//!
//! # fn main() {
//! match DeliveryConfig::from_file("delivery.yaml") {
//!     Ok(_config) => println!("Config loaded successfully"),
//!     Err(DeliveryError::ConfigError(msg)) => eprintln!("Config error: {}", msg),
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # }
//! ```
//!
//! Status codes are left to the caller. The library reports unsatisfiable
//! ranges and failed preconditions as data, and the bundled binary shows one
//! way of mapping them to 206, 304, 412 and 416.

pub mod compression;
pub mod conditional;
pub mod config;
pub mod entity_response;
pub mod error;
pub mod header_value;
pub mod headers;
pub mod models;
pub mod range_parser;
pub mod transmission;
pub mod zero_copy;

// Re-export commonly used types
pub use compression::{BodyEncoder, CompressionNegotiator, DEFAULT_COMPRESSION_LEVEL};
pub use conditional::ConditionalRequest;
pub use config::DeliveryConfig;
pub use entity_response::{EntityResponse, PreparedResponse, MULTIPART_BOUNDARY};
pub use error::{DeliveryError, Result};
pub use header_value::{HeaderToken, HeaderValueParser};
pub use headers::{ConsumedHeader, ProducedHeader};
pub use models::{CompressionType, EntityInfo, HttpMethod, RangeItem};
pub use range_parser::{RangeOutcome, RangeParser};
pub use transmission::{
    BytesTransmission, EntitySource, FileOpener, FileTransmission, RetryingOpener,
    StreamTransmission, TransmissionStrategy, TransmitControl, TransmitSettings,
};
pub use zero_copy::MmapTransmission;
