//! Content-coding decompression and recompression.
//!
//! # Responsibilities
//! - Parse `Content-Encoding` into known codings (gzip, br, deflate)
//! - Decode a fully buffered body, last-applied coding first
//! - Re-encode a rewritten body with the same codings
//!
//! # Design Decisions
//! - Unknown or absent codings are a passthrough, never an error
//! - A corrupt stream yields the original bytes plus a warning
//! - `deflate` accepts both zlib-wrapped and raw streams

use std::io::{Cursor, Read, Write};

use bytes::Bytes;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;

use crate::body::{BodyOutcome, CodecError};

const BROTLI_BUFFER: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// A content coding this proxy can decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Gzip,
    Brotli,
    Deflate,
}

impl ContentCoding {
    /// Parse a single coding token.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "gzip" | "x-gzip" => Some(Self::Gzip),
            "br" => Some(Self::Brotli),
            "deflate" => Some(Self::Deflate),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gzip => "gzip",
            Self::Brotli => "br",
            Self::Deflate => "deflate",
        }
    }
}

/// Parse a `Content-Encoding` header value into the codings it lists, in
/// the order they were applied.
///
/// Returns `Ok(vec![])` for absent/identity encodings and
/// `Err(UnsupportedEncoding)` if any listed coding is unknown.
pub fn parse_codings(header: Option<&str>) -> Result<Vec<ContentCoding>, CodecError> {
    let Some(header) = header else {
        return Ok(Vec::new());
    };

    header
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty() && !token.eq_ignore_ascii_case("identity"))
        .map(|token| {
            ContentCoding::from_token(token)
                .ok_or_else(|| CodecError::UnsupportedEncoding(token.to_string()))
        })
        .collect()
}

/// Decompress `body` according to its declared `Content-Encoding`.
pub fn decompress(body: Bytes, content_encoding: Option<&str>) -> BodyOutcome {
    let codings = match parse_codings(content_encoding) {
        Ok(codings) if codings.is_empty() => return BodyOutcome::skipped(body),
        Ok(codings) => codings,
        Err(e) => {
            tracing::debug!(error = %e, "Leaving body encoded");
            return BodyOutcome::skipped(body);
        }
    };

    match decode_all(&body, &codings) {
        Ok(decoded) => BodyOutcome::applied(decoded.into()),
        Err(e) => {
            tracing::warn!(error = %e, encoding = ?content_encoding, "Decompression failed, passing body through");
            BodyOutcome::fallback(body)
        }
    }
}

/// Decode `body` through every coding, last-applied first.
pub fn decode_all(body: &[u8], codings: &[ContentCoding]) -> Result<Vec<u8>, CodecError> {
    let mut current = body.to_vec();
    for coding in codings.iter().rev() {
        current = decode_one(&current, *coding)?;
    }
    Ok(current)
}

/// Encode `body` through every coding, in order.
pub fn encode_all(body: &[u8], codings: &[ContentCoding]) -> Result<Vec<u8>, CodecError> {
    let mut current = body.to_vec();
    for coding in codings {
        current = encode_one(&current, *coding)?;
    }
    Ok(current)
}

fn decode_one(body: &[u8], coding: ContentCoding) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(body.len() * 2);
    let result = match coding {
        ContentCoding::Gzip => GzDecoder::new(Cursor::new(body)).read_to_end(&mut out),
        ContentCoding::Brotli => {
            brotli::Decompressor::new(Cursor::new(body), BROTLI_BUFFER).read_to_end(&mut out)
        }
        ContentCoding::Deflate => match ZlibDecoder::new(Cursor::new(body)).read_to_end(&mut out) {
            Ok(n) => Ok(n),
            Err(_) => {
                out.clear();
                DeflateDecoder::new(Cursor::new(body)).read_to_end(&mut out)
            }
        },
    };

    result.map(|_| out).map_err(|source| CodecError::Decompress {
        coding: coding.as_str(),
        source,
    })
}

fn encode_one(body: &[u8], coding: ContentCoding) -> Result<Vec<u8>, CodecError> {
    let map_err = |source| CodecError::Compress {
        coding: coding.as_str(),
        source,
    };

    match coding {
        ContentCoding::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body).map_err(map_err)?;
            encoder.finish().map_err(map_err)
        }
        ContentCoding::Deflate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(body).map_err(map_err)?;
            encoder.finish().map_err(map_err)
        }
        ContentCoding::Brotli => {
            let mut encoder = brotli::CompressorWriter::new(
                Vec::new(),
                BROTLI_BUFFER,
                BROTLI_QUALITY,
                BROTLI_WINDOW,
            );
            encoder.write_all(body).map_err(map_err)?;
            encoder.flush().map_err(map_err)?;
            Ok(encoder.into_inner())
        }
    }
}
