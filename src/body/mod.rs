//! Response body transformation subsystem.
//!
//! # Data Flow
//! ```text
//! Buffered upstream body + RewriteContext
//!     → codec.rs (strip gzip / br / deflate)
//!     → rewrite.rs (textual content only, route has a public URL)
//!         → charset.rs (declared charset, then <meta> fallback)
//!         → literal target → public substitution
//!     → codec.rs (optional re-encode)
//!     → Transformed body + outgoing Content-Encoding
//! ```
//!
//! # Design Decisions
//! - Best effort: every failure degrades to the untransformed bytes
//! - Failures are values (`Outcome::Fallback`), never panics or errors
//! - Never applied to streamed responses

pub mod charset;
pub mod codec;
pub mod rewrite;

use bytes::Bytes;
use thiserror::Error;

use crate::config::RewriteConfig;
use crate::observability::metrics;

pub use codec::ContentCoding;

/// Error raised inside the codec; always recovered by the caller.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{coding} decompression failed: {source}")]
    Decompress {
        coding: &'static str,
        source: std::io::Error,
    },

    #[error("{coding} compression failed: {source}")]
    Compress {
        coding: &'static str,
        source: std::io::Error,
    },

    #[error("unsupported content encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("charset: {0}")]
    Charset(String),
}

/// What a transformation step did with the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The body was transformed.
    Applied,
    /// Nothing to do; the body is unchanged.
    Skipped,
    /// The transformation failed; the body is the original bytes.
    Fallback,
}

/// A body together with the outcome of the step that produced it.
#[derive(Debug, Clone)]
pub struct BodyOutcome {
    pub body: Bytes,
    pub outcome: Outcome,
}

impl BodyOutcome {
    pub fn applied(body: Bytes) -> Self {
        Self { body, outcome: Outcome::Applied }
    }

    pub fn skipped(body: Bytes) -> Self {
        Self { body, outcome: Outcome::Skipped }
    }

    pub fn fallback(body: Bytes) -> Self {
        Self { body, outcome: Outcome::Fallback }
    }
}

/// Per-response inputs to the body transformation.
#[derive(Debug, Clone, Default)]
pub struct RewriteContext {
    /// Upstream base URL to look for.
    pub target_url: String,
    /// Replacement; `None` disables text rewriting.
    pub public_url: Option<String>,
    /// Upstream `Content-Encoding`, if any.
    pub content_encoding: Option<String>,
    /// Upstream `Content-Type`, if any.
    pub content_type: Option<String>,
}

/// Result of transforming a buffered body.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub body: Bytes,
    /// `Content-Encoding` to emit, when the body is still (or again) encoded.
    pub content_encoding: Option<String>,
    /// Whether URL substitution changed the body.
    pub rewritten: bool,
}

/// Applies decompression and URL rewriting to buffered bodies.
#[derive(Debug, Clone)]
pub struct BodyRewriter {
    content_types: Vec<String>,
    recompress: bool,
}

impl BodyRewriter {
    pub fn new(config: &RewriteConfig) -> Self {
        Self {
            content_types: config.content_types.clone(),
            recompress: config.recompress,
        }
    }

    /// Transform a fully buffered upstream body.
    pub fn transform(&self, ctx: &RewriteContext, body: Bytes) -> Transformed {
        let encoding = ctx.content_encoding.as_deref();
        let decompressed = codec::decompress(body, encoding);
        if decompressed.outcome == Outcome::Fallback {
            metrics::record_rewrite_fallback("decompress");
        }

        let rewrite = match &ctx.public_url {
            Some(public) if rewrite::is_textual(ctx.content_type.as_deref(), &self.content_types) => {
                // Rewriting still-compressed bytes would corrupt them.
                if decompressed.outcome == Outcome::Fallback {
                    decompressed.clone()
                } else {
                    let outcome = rewrite::rewrite_urls(
                        decompressed.body.clone(),
                        ctx.content_type.as_deref(),
                        &ctx.target_url,
                        public,
                    );
                    if outcome.outcome == Outcome::Fallback {
                        metrics::record_rewrite_fallback("charset");
                    }
                    outcome
                }
            }
            _ => BodyOutcome::skipped(decompressed.body.clone()),
        };
        let rewritten = rewrite.outcome == Outcome::Applied;

        if self.recompress && decompressed.outcome == Outcome::Applied {
            if let Ok(codings) = codec::parse_codings(encoding) {
                match codec::encode_all(&rewrite.body, &codings) {
                    Ok(encoded) => {
                        return Transformed {
                            body: Bytes::from(encoded),
                            content_encoding: ctx.content_encoding.clone(),
                            rewritten,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Recompression failed, sending decoded body");
                    }
                }
            }
        }

        Transformed {
            body: rewrite.body,
            content_encoding: None,
            rewritten,
        }
    }
}
