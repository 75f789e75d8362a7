//! Entity Delivery CLI
//!
//! Serves one local file as if answering a single HTTP request and prints the
//! raw HTTP/1.1 response to stdout. Useful for checking how request headers
//! shape the status, headers and body.

use anyhow::{bail, Context};
use entity_delivery::{
    CompressionNegotiator, CompressionType, ConditionalRequest, DeliveryConfig, EntityInfo,
    EntityResponse, EntitySource, HttpMethod, RangeOutcome, RangeParser,
    RetryingOpener,
};
use http::header::{CONTENT_RANGE, TRANSFER_ENCODING};
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

const USAGE: &str =
    "Usage: entity-delivery <file> [-H \"Name: value\"]... [--head] [--config path] [--verbose]";

struct CliArgs {
    file: PathBuf,
    headers: HeaderMap,
    head: bool,
    config: Option<PathBuf>,
    verbose: bool,
}

impl CliArgs {
    fn parse<I: Iterator<Item = String>>(mut args: I) -> anyhow::Result<Self> {
        let mut file = None;
        let mut headers = HeaderMap::new();
        let mut head = false;
        let mut config = None;
        let mut verbose = false;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-H" | "--header" => {
                    let raw = args.next().context("-H needs a \"Name: value\" argument")?;
                    let (name, value) = raw
                        .split_once(':')
                        .with_context(|| format!("header {:?} is missing ':'", raw))?;
                    let name = HeaderName::from_bytes(name.trim().as_bytes())
                        .with_context(|| format!("invalid header name in {:?}", raw))?;
                    let value = HeaderValue::from_str(value.trim())
                        .with_context(|| format!("invalid header value in {:?}", raw))?;
                    headers.append(name, value);
                }
                "--head" => head = true,
                "--config" | "-c" => {
                    config = Some(PathBuf::from(args.next().context("--config needs a path")?));
                }
                "--verbose" | "-v" => verbose = true,
                "--help" | "-h" => bail!(USAGE),
                other if other.starts_with('-') => bail!("unknown option {}\n{}", other, USAGE),
                other => {
                    if file.replace(PathBuf::from(other)).is_some() {
                        bail!("only one file may be served\n{}", USAGE);
                    }
                }
            }
        }

        Ok(CliArgs {
            file: file.context(USAGE)?,
            headers,
            head,
            config,
            verbose,
        })
    }
}

fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse(env::args().skip(1))?;

    // Logs go to stderr so stdout carries only the response
    tracing_subscriber::fmt()
        .with_max_level(if args.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        })
        .with_target(false)
        .with_line_number(true)
        .with_writer(io::stderr)
        .init();

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            DeliveryConfig::from_file(path)?
        }
        None => DeliveryConfig::default(),
    };

    let entity = describe_entity(&args.file)?;
    let method = if args.head {
        HttpMethod::Head
    } else {
        HttpMethod::Get
    };
    info!(
        "Serving {} ({} bytes, {}) for {}",
        args.file.display(),
        entity.content_length,
        entity.content_type,
        method
    );

    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    serve(&args, &config, &entity, method, &mut out)?;
    out.flush()?;
    Ok(())
}

fn serve<W: Write>(
    args: &CliArgs,
    config: &DeliveryConfig,
    entity: &EntityInfo,
    method: HttpMethod,
    out: &mut W,
) -> anyhow::Result<()> {
    let request = &args.headers;
    let etag = entity.etag.clone().unwrap_or_default();
    let last_modified = entity.last_modified.unwrap_or(UNIX_EPOCH);

    let mut headers = HeaderMap::new();
    entity.write_validators(&mut headers)?;

    if let Some(status) = precondition_status(request, &etag, last_modified) {
        info!("Precondition result: {}", status);
        return write_head(out, status, &headers);
    }

    let mut ranges = RangeParser::from_headers(request, entity.content_length);
    if ConditionalRequest::new(request).check_if_range(&etag, last_modified) == Some(false) {
        debug!("If-Range validator is stale, sending the full entity");
        ranges = RangeOutcome::Unknown;
    }
    if ranges.is_unsatisfiable() {
        headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(&format!("bytes */{}", entity.content_length))?,
        );
        return write_head(out, StatusCode::RANGE_NOT_SATISFIABLE, &headers);
    }

    let compression = CompressionNegotiator::from_headers(request);
    let response = EntityResponse::select(ranges);
    let status = if response.is_partial() {
        StatusCode::PARTIAL_CONTENT
    } else {
        StatusCode::OK
    };

    let prepared = match response.send_headers(compression, entity, &mut headers) {
        Ok(prepared) => prepared.with_compression_level(config.compression_level),
        Err(e) if e.is_fatal_negotiation() => {
            info!("Negotiation failed: {}", e);
            return write_head(out, StatusCode::NOT_ACCEPTABLE, &HeaderMap::new());
        }
        Err(e) => return Err(e.into()),
    };

    let chunked = prepared.content_length().is_none() && method == HttpMethod::Get;
    if chunked {
        headers.insert(TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
    }
    write_head(out, status, &headers)?;

    let opener = RetryingOpener::from_config(config);
    let mut strategy = EntitySource::File(args.file.clone()).into_strategy(config, &opener)?;

    let written = if chunked {
        let mut body = ChunkedWriter::new(&mut *out);
        let written = prepared.send_body(method, &mut body, strategy.as_mut())?;
        body.finish()?;
        written
    } else {
        prepared.send_body(method, &mut *out, strategy.as_mut())?
    };
    info!("Sent {} with {} body bytes", status, written);
    Ok(())
}

/// RFC 7232 section 6 evaluation order, minus the method-specific branches
fn precondition_status(
    request: &HeaderMap,
    etag: &str,
    last_modified: std::time::SystemTime,
) -> Option<StatusCode> {
    let conditional = ConditionalRequest::new(request);

    match conditional.check_if_match(etag, true) {
        Some(false) => return Some(StatusCode::PRECONDITION_FAILED),
        Some(true) => {}
        None => {
            if conditional.check_if_unmodified_since(last_modified) == Some(false)
                || conditional.check_unless_modified_since(last_modified) == Some(false)
            {
                return Some(StatusCode::PRECONDITION_FAILED);
            }
        }
    }

    match conditional.check_if_none_match(etag, true) {
        Some(false) => Some(StatusCode::NOT_MODIFIED),
        Some(true) => None,
        None => match conditional.check_if_modified_since(last_modified) {
            Some(false) => Some(StatusCode::NOT_MODIFIED),
            _ => None,
        },
    }
}

fn describe_entity(path: &Path) -> anyhow::Result<EntityInfo> {
    let metadata =
        fs::metadata(path).with_context(|| format!("cannot stat {}", path.display()))?;
    if !metadata.is_file() {
        bail!("{} is not a regular file", path.display());
    }

    // A trailing .gz marks an entity stored pre-compressed
    let (compression, content_path) = match path.extension().and_then(|e| e.to_str()) {
        Some("gz") => (CompressionType::GZip, path.with_extension("")),
        _ => (CompressionType::None, path.to_path_buf()),
    };

    let mut entity = EntityInfo::new(metadata.len(), content_type_for(&content_path))
        .with_compression(compression);
    match metadata.modified() {
        Ok(modified) => {
            let secs = modified
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            entity = entity
                .with_etag(format!("\"{:x}-{:x}\"", metadata.len(), secs))
                .with_last_modified(modified);
        }
        Err(e) => debug!("No modification time for {}: {}", path.display(), e),
    }
    Ok(entity)
}

fn content_type_for(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

fn write_head<W: Write>(out: &mut W, status: StatusCode, headers: &HeaderMap) -> anyhow::Result<()> {
    write!(
        out,
        "HTTP/1.1 {} {}\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    )?;
    for (name, value) in headers {
        out.write_all(name.as_str().as_bytes())?;
        out.write_all(b": ")?;
        out.write_all(value.as_bytes())?;
        out.write_all(b"\r\n")?;
    }
    out.write_all(b"\r\n")?;
    Ok(())
}

/// HTTP/1.1 chunked transfer coding over any writer
struct ChunkedWriter<W: Write> {
    inner: W,
}

impl<W: Write> ChunkedWriter<W> {
    fn new(inner: W) -> Self {
        ChunkedWriter { inner }
    }

    fn finish(mut self) -> io::Result<W> {
        self.inner.write_all(b"0\r\n\r\n")?;
        self.inner.flush()?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        write!(self.inner, "{:x}\r\n", buf.len())?;
        self.inner.write_all(buf)?;
        self.inner.write_all(b"\r\n")?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
