//! Literal URL substitution in textual bodies.

use bytes::Bytes;

use crate::body::{charset, BodyOutcome};

/// Whether `content_type` matches one of the configured textual prefixes.
pub fn is_textual(content_type: Option<&str>, prefixes: &[String]) -> bool {
    let Some(content_type) = content_type else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    prefixes
        .iter()
        .any(|prefix| mime.starts_with(&prefix.to_ascii_lowercase()))
}

/// Replace every occurrence of `target` with `public` in `body`.
///
/// The body is decoded with the charset resolved from `content_type` (or a
/// `<meta>` declaration) and re-encoded with the same charset. Any decode
/// or encode failure returns the original bytes as a fallback.
pub fn rewrite_urls(body: Bytes, content_type: Option<&str>, target: &str, public: &str) -> BodyOutcome {
    if target.is_empty() {
        return BodyOutcome::skipped(body);
    }

    let decoded = match charset::decode(content_type, &body) {
        Ok(decoded) => decoded,
        Err(e) => {
            tracing::warn!(error = %e, content_type = ?content_type, "Charset resolution failed, body left unchanged");
            return BodyOutcome::fallback(body);
        }
    };

    if !decoded.text.contains(target) {
        return BodyOutcome::skipped(body);
    }

    let replaced = decoded.text.replace(target, public);
    match charset::encode(&replaced, decoded.encoding) {
        Ok(bytes) => BodyOutcome::applied(Bytes::from(bytes)),
        Err(e) => {
            tracing::warn!(error = %e, "Re-encoding failed, body left unchanged");
            BodyOutcome::fallback(body)
        }
    }
}
