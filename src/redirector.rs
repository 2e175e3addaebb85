//! Regex-driven URI redirector.
//!
//! Extracts a part of the request URI, runs a regex substitution over it, and
//! answers with an HTTP redirect pointing at the result. Invalid match-part
//! and status-code settings are normalized rather than rejected.

use async_trait::async_trait;
use hyper::{Body, StatusCode};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::context::HttpContext;
use crate::error::GantryResult;
use crate::registry::Handler;

/// Redirector configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RedirectorConfig {
    /// Regex run against the selected URI part.
    #[serde(rename = "match")]
    pub pattern: String,
    /// Which part of the request to match: `uri`, `full`, or `path`.
    #[serde(default)]
    pub match_part: String,
    /// Replacement template; `$1`/`${1}` backreferences refer to capture
    /// groups of `pattern`.
    #[serde(default)]
    pub replacement: String,
    #[serde(default)]
    pub status_code: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MatchPart {
    /// Path plus query.
    Uri,
    /// Full URL including scheme and authority.
    Full,
    /// Path only.
    Path,
}

pub struct Redirector {
    re: Regex,
    match_part: MatchPart,
    replacement: String,
    status_code: StatusCode,
}

impl Redirector {
    pub fn new(config: &RedirectorConfig) -> GantryResult<Self> {
        let re = Regex::new(&config.pattern)?;

        // Match part is case-sensitive; anything unrecognized becomes "uri".
        let match_part = match config.match_part.as_str() {
            "uri" => MatchPart::Uri,
            "full" => MatchPart::Full,
            "path" => MatchPart::Path,
            other => {
                if !other.is_empty() {
                    warn!("unknown match_part {:?}, using \"uri\"", other);
                }
                MatchPart::Uri
            }
        };

        let status_code = match config.status_code {
            301 | 302 | 303 | 304 | 307 | 308 => {
                StatusCode::from_u16(config.status_code).expect("validated status code")
            }
            other => {
                if other != 0 {
                    warn!("unsupported redirect status {}, using 301", other);
                }
                StatusCode::MOVED_PERMANENTLY
            }
        };

        Ok(Redirector {
            re,
            match_part,
            replacement: config.replacement.clone(),
            status_code,
        })
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn match_part_name(&self) -> &'static str {
        match self.match_part {
            MatchPart::Uri => "uri",
            MatchPart::Full => "full",
            MatchPart::Path => "path",
        }
    }

    fn subject(&self, ctx: &HttpContext) -> String {
        match self.match_part {
            MatchPart::Path => ctx.path().to_string(),
            MatchPart::Uri => {
                let query = ctx.query();
                if query.is_empty() {
                    ctx.path().to_string()
                } else {
                    format!("{}?{}", ctx.path(), query)
                }
            }
            MatchPart::Full => {
                let uri = ctx.uri();
                if uri.scheme().is_some() && uri.authority().is_some() {
                    return uri.to_string();
                }
                // Origin-form request: reassemble from the host header.
                let query = ctx.query();
                if query.is_empty() {
                    format!("http://{}{}", ctx.host(), ctx.path())
                } else {
                    format!("http://{}{}?{}", ctx.host(), ctx.path(), query)
                }
            }
        }
    }
}

#[async_trait]
impl Handler for Redirector {
    async fn handle(&self, ctx: &mut HttpContext) {
        let subject = self.subject(ctx);
        // A non-matching regex leaves the subject unchanged, and the
        // redirect is still emitted.
        let location = self
            .re
            .replace_all(&subject, self.replacement.as_str())
            .into_owned();

        ctx.set_location(&location);
        ctx.set_status_code(self.status_code);
        let reason = self.status_code.canonical_reason().unwrap_or_default();
        ctx.set_body(Body::from(reason));
    }
}
