//! Charset discovery for textual bodies.
//!
//! The declared `charset=` parameter wins; UTF-8 is assumed when none is
//! declared. If the body does not decode cleanly under that charset, the
//! raw bytes are scanned for an HTML `<meta ... charset=...>` declaration
//! and decoding is retried once with it.

use std::borrow::Cow;
use std::sync::LazyLock;

use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;

use crate::body::CodecError;

/// Matches `<meta charset="x">` and `<meta http-equiv=... content="...; charset=x">`.
static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta\b[^>]*?charset\s*=\s*["']?\s*([A-Za-z0-9_.:\-]+)"#)
        .expect("meta charset pattern is valid")
});

/// A body decoded to text, with the encoding that decoded it.
#[derive(Debug)]
pub struct Decoded<'a> {
    pub text: Cow<'a, str>,
    pub encoding: &'static Encoding,
}

/// Extract the `charset` parameter from a `Content-Type` value.
pub fn declared_charset(content_type: Option<&str>) -> Option<&str> {
    content_type?
        .split(';')
        .skip(1)
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\''))
        .filter(|value| !value.is_empty())
}

/// Find a charset declared in an HTML `<meta>` tag.
pub fn meta_charset(body: &[u8]) -> Option<&str> {
    META_CHARSET
        .captures(body)
        .and_then(|caps| caps.get(1))
        .and_then(|m| std::str::from_utf8(m.as_bytes()).ok())
}

/// Resolve the encoding of `body` and decode it.
///
/// Fails only when neither the declared charset nor a `<meta>` charset
/// decodes the body without errors.
pub fn decode<'a>(content_type: Option<&str>, body: &'a [u8]) -> Result<Decoded<'a>, CodecError> {
    let declared = declared_charset(content_type);
    let primary = match declared {
        Some(label) => Encoding::for_label(label.as_bytes()),
        None => Some(UTF_8),
    };

    if let Some(encoding) = primary {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(body) {
            return Ok(Decoded { text, encoding });
        }
    }

    let meta = meta_charset(body).ok_or_else(|| {
        CodecError::Charset(format!(
            "body is not valid {} and declares no <meta> charset",
            declared.unwrap_or("utf-8")
        ))
    })?;
    let encoding = Encoding::for_label(meta.as_bytes())
        .ok_or_else(|| CodecError::Charset(format!("unknown <meta> charset {meta:?}")))?;

    tracing::debug!(
        declared = declared.unwrap_or("utf-8"),
        meta = encoding.name(),
        "Retrying decode with <meta> charset"
    );

    encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .map(|text| Decoded { text, encoding })
        .ok_or_else(|| CodecError::Charset(format!("body is not valid {}", encoding.name())))
}

/// Encode `text` back with `encoding`, refusing lossy output.
pub fn encode(text: &str, encoding: &'static Encoding) -> Result<Vec<u8>, CodecError> {
    let (bytes, used, unmappable) = encoding.encode(text);
    if used != encoding || unmappable {
        return Err(CodecError::Charset(format!(
            "text cannot be encoded as {}",
            encoding.name()
        )));
    }
    Ok(bytes.into_owned())
}
