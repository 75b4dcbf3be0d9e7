//! Git smart-HTTP gateway.
//!
//! ## Overview
//!
//! Fronts `git-http-backend` as a CGI script so bundles can be cloned over
//! HTTP. One request moves through:
//!
//! ```text
//! Received ─> (Decompressing) ─> Invoking ─> Parsing ─┬─> Success ─┐
//!                                                     └─> Failure ─┴─> Responded
//! ```
//!
//! | Module    | Responsibility                                         |
//! |-----------|--------------------------------------------------------|
//! | `process` | Spawn, feed stdin, drain stdout/stderr concurrently    |
//! | `cgi`     | Request → CGI env; raw output → headers + body         |
//!
//! Any stderr output from the backend is a failure, even when stdout holds a
//! well-formed response. The failure status comes from the backend's own
//! `Status` header, defaulting to 500.

pub mod cgi;
pub mod process;

use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use flate2::read::GzDecoder;
use tracing::{debug, info, warn};

use crate::bundle::id::BundleId;
use crate::config::GitSection;
use crate::errors::GatewayError;
use cgi::{CgiHeaders, CgiRequest, MissingTerminatorPolicy};
use process::{ProcessInvocation, ProcessResult};

/// Largest request body accepted, before or after gzip inflation.
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// An inbound git protocol request, detached from the HTTP framework.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub method: Method,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// How a backend invocation ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// Relay the backend's headers and body verbatim.
    Success {
        status: StatusCode,
        headers: CgiHeaders,
        body: Vec<u8>,
    },
    /// Backend wrote to stderr.
    Failure { status: StatusCode, reason: String },
}

impl GatewayOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayOutcome::Success { status, .. } | GatewayOutcome::Failure { status, .. } => {
                *status
            }
        }
    }
}

impl IntoResponse for GatewayOutcome {
    fn into_response(self) -> Response {
        match self {
            GatewayOutcome::Success {
                status,
                headers,
                body,
            } => {
                let mut response = Response::new(Body::from(body));
                *response.status_mut() = status;
                let out = response.headers_mut();
                for (name, value) in headers.iter() {
                    if name.eq_ignore_ascii_case("status") {
                        continue;
                    }
                    match (
                        HeaderName::from_bytes(name.as_bytes()),
                        HeaderValue::from_bytes(value.as_bytes()),
                    ) {
                        (Ok(name), Ok(value)) => {
                            out.append(name, value);
                        }
                        _ => warn!(header = %name, "dropping unrepresentable backend header"),
                    }
                }
                response
            }
            GatewayOutcome::Failure { status, reason } => (status, reason).into_response(),
        }
    }
}

/// Bridges HTTP requests onto a CGI git backend.
#[derive(Debug, Clone)]
pub struct SmartHttpGateway {
    backend: PathBuf,
    backend_args: Vec<String>,
    bundles_root: PathBuf,
    timeout: Option<Duration>,
    policy: MissingTerminatorPolicy,
    body_limit: usize,
}

impl SmartHttpGateway {
    pub fn new(bundles_root: impl Into<PathBuf>, git: &GitSection) -> Self {
        Self {
            backend: git.backend.clone(),
            backend_args: git.backend_args.clone(),
            bundles_root: bundles_root.into(),
            timeout: (git.timeout_secs > 0).then(|| Duration::from_secs(git.timeout_secs)),
            policy: git.missing_terminator,
            body_limit: MAX_BODY_BYTES,
        }
    }

    /// Cap on the inflated request body.
    pub fn with_body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }

    /// Repository root for `bundle_id`, validated and checked for existence.
    pub fn repository_root(&self, bundle_id: &str) -> Result<PathBuf, GatewayError> {
        let id = BundleId::parse(bundle_id)
            .map_err(|_| GatewayError::InvalidBundleId(bundle_id.to_string()))?;
        let root = self.bundles_root.join(id.as_str());
        if !root.is_dir() {
            return Err(GatewayError::BundleNotFound(id.to_string()));
        }
        Ok(root)
    }

    /// Run one request through the backend.
    pub async fn handle(
        &self,
        bundle_id: &str,
        path: &str,
        request: GatewayRequest,
    ) -> Result<GatewayOutcome, GatewayError> {
        validate_git_path(path)?;
        let root = self.repository_root(bundle_id)?;

        let stdin = inflate_body(&request.headers, request.body, self.body_limit)?;
        let env = cgi::build_environment(
            &CgiRequest {
                method: &request.method,
                query: request.query.as_deref(),
                headers: &request.headers,
                content_length: stdin.len(),
            },
            &root,
            path,
        );
        debug!(bundle_id, path, stdin_len = stdin.len(), "invoking git backend");

        let result = process::invoke(
            ProcessInvocation::new(self.backend.as_os_str())
                .args(self.backend_args.iter())
                .envs(env)
                .stdin(stdin)
                .timeout(self.timeout),
        )
        .await?;

        let outcome = classify(&result, self.policy)?;
        info!(
            bundle_id,
            path,
            method = %request.method,
            status = outcome.status().as_u16(),
            "git request served"
        );
        Ok(outcome)
    }
}

/// Decide Success or Failure from a finished backend run.
pub fn classify(
    result: &ProcessResult,
    policy: MissingTerminatorPolicy,
) -> Result<GatewayOutcome, GatewayError> {
    let parsed = cgi::parse_response(&result.stdout, policy);

    if !result.stderr.is_empty() {
        warn!(
            stderr = %String::from_utf8_lossy(&result.stderr).trim(),
            exit_code = ?result.status.code(),
            "git backend wrote to stderr"
        );
        let declared = parsed.ok().and_then(|r| r.headers.status());
        let (status, reason) = match declared {
            Some((code, reason)) => match StatusCode::from_u16(code) {
                Ok(status) => (status, reason),
                Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into()),
            },
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal server error".into()),
        };
        return Ok(GatewayOutcome::Failure { status, reason });
    }

    let response = parsed.map_err(|e| GatewayError::Protocol(e.to_string()))?;
    let status = match response.headers.status() {
        Some((code, _)) => StatusCode::from_u16(code).map_err(|_| {
            GatewayError::Protocol(format!("backend declared invalid status {}", code))
        })?,
        None => StatusCode::OK,
    };
    Ok(GatewayOutcome::Success {
        status,
        headers: response.headers,
        body: response.body,
    })
}

/// Inflate a gzip-encoded request body; other bodies pass through.
///
/// Inflated output longer than `limit` bytes is refused.
pub fn inflate_body(
    headers: &HeaderMap,
    body: Bytes,
    limit: usize,
) -> Result<Vec<u8>, GatewayError> {
    let gzipped = headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            let v = v.trim();
            v.eq_ignore_ascii_case("gzip") || v.eq_ignore_ascii_case("x-gzip")
        })
        .unwrap_or(false);
    if !gzipped {
        return Ok(body.to_vec());
    }

    let mut inflated = Vec::with_capacity(body.len().saturating_mul(4).min(limit));
    GzDecoder::new(body.as_ref())
        .take(limit as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(GatewayError::MalformedGzip)?;
    if inflated.len() > limit {
        return Err(GatewayError::BodyTooLarge { limit });
    }
    Ok(inflated)
}

fn validate_git_path(path: &str) -> Result<(), GatewayError> {
    let escapes = Path::new(path).components().any(|c| {
        matches!(
            c,
            std::path::Component::ParentDir | std::path::Component::RootDir
        )
    });
    if escapes {
        return Err(GatewayError::InvalidPath(path.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;
    use std::os::unix::process::ExitStatusExt;
    use std::process::ExitStatus;

    fn result(stdout: &[u8], stderr: &[u8]) -> ProcessResult {
        ProcessResult {
            stdout: stdout.to_vec(),
            stderr: stderr.to_vec(),
            status: ExitStatus::from_raw(0),
        }
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn test_classify_success_relays_headers_and_body() {
        let out = classify(
            &result(b"Content-Type: x\r\nCache-Control: no-cache\r\n\r\n\x00PACK", b""),
            MissingTerminatorPolicy::Reject,
        )
        .unwrap();
        match out {
            GatewayOutcome::Success {
                status,
                headers,
                body,
            } => {
                assert_eq!(status, StatusCode::OK);
                assert_eq!(headers.get("content-type"), Some("x"));
                assert_eq!(body, b"\x00PACK");
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_classify_success_uses_declared_status() {
        let out = classify(
            &result(b"Status: 404 Not Found\r\n\r\n", b""),
            MissingTerminatorPolicy::Reject,
        )
        .unwrap();
        assert_eq!(out.status(), StatusCode::NOT_FOUND);
        assert!(matches!(out, GatewayOutcome::Success { .. }));
    }

    #[test]
    fn test_classify_stderr_dominates_valid_stdout() {
        let out = classify(
            &result(b"status: 200 OK\r\nContent-Type: x\r\n\r\nbody", b"warning: degraded"),
            MissingTerminatorPolicy::Reject,
        )
        .unwrap();
        assert_eq!(
            out,
            GatewayOutcome::Failure {
                status: StatusCode::OK,
                reason: "OK".into()
            }
        );
    }

    #[test]
    fn test_classify_failure_defaults_to_500() {
        let out = classify(
            &result(b"Content-Type: x\r\n\r\n", b"fatal: not a git repository"),
            MissingTerminatorPolicy::Reject,
        )
        .unwrap();
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(matches!(out, GatewayOutcome::Failure { .. }));
    }

    #[test]
    fn test_classify_failure_with_unparseable_status_is_500() {
        let out = classify(
            &result(b"Status: teapot\r\n\r\n", b"err"),
            MissingTerminatorPolicy::Reject,
        )
        .unwrap();
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_classify_failure_with_garbage_stdout_is_500() {
        let out = classify(&result(b"garbage", b"err"), MissingTerminatorPolicy::Reject).unwrap();
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_classify_missing_terminator_is_protocol_error() {
        let err = classify(&result(b"garbage", b""), MissingTerminatorPolicy::Reject).unwrap_err();
        assert!(matches!(err, GatewayError::Protocol(_)));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_classify_missing_terminator_fallback_policy() {
        let out = classify(&result(b"garbage", b""), MissingTerminatorPolicy::TreatAsBody).unwrap();
        match out {
            GatewayOutcome::Success {
                status,
                headers,
                body,
            } => {
                assert_eq!(status, StatusCode::OK);
                assert!(headers.is_empty());
                assert_eq!(body, b"garbage");
            }
            other => panic!("Expected Success, got {:?}", other),
        }
    }

    #[test]
    fn test_inflate_body_gzip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let plain = b"0032want 0123456789abcdef\n".repeat(100);
        let inflated = inflate_body(&headers, Bytes::from(gzip(&plain)), MAX_BODY_BYTES).unwrap();
        assert_eq!(inflated, plain);
    }

    #[test]
    fn test_inflate_body_passthrough() {
        let headers = HeaderMap::new();
        let inflated = inflate_body(&headers, Bytes::from_static(b"raw"), MAX_BODY_BYTES).unwrap();
        assert_eq!(inflated, b"raw");
    }

    #[test]
    fn test_inflate_body_malformed_gzip() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let err =
            inflate_body(&headers, Bytes::from_static(b"not gzip"), MAX_BODY_BYTES).unwrap_err();
        assert!(matches!(err, GatewayError::MalformedGzip(_)));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_inflate_body_rejects_oversized_output() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        let bomb = gzip(&vec![0u8; 1024 * 1024]);
        assert!(bomb.len() < 8 * 1024);

        let err = inflate_body(&headers, Bytes::from(bomb.clone()), 64 * 1024).unwrap_err();
        assert!(matches!(err, GatewayError::BodyTooLarge { limit } if limit == 64 * 1024));
        assert_eq!(err.status(), StatusCode::PAYLOAD_TOO_LARGE);

        let exact = inflate_body(&headers, Bytes::from(bomb), 1024 * 1024).unwrap();
        assert_eq!(exact.len(), 1024 * 1024);
    }

    #[test]
    fn test_validate_git_path() {
        assert!(validate_git_path("info/refs").is_ok());
        assert!(validate_git_path("app.git/git-upload-pack").is_ok());
        assert!(validate_git_path("../etc/passwd").is_err());
        assert!(validate_git_path("a/../../b").is_err());
    }

    #[test]
    fn test_repository_root_validation() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("abc123")).unwrap();
        let gateway = SmartHttpGateway::new(dir.path(), &GitSection::default());

        assert_eq!(
            gateway.repository_root("abc123").unwrap(),
            dir.path().join("abc123")
        );
        assert!(matches!(
            gateway.repository_root("missing1"),
            Err(GatewayError::BundleNotFound(_))
        ));
        assert!(matches!(
            gateway.repository_root(".."),
            Err(GatewayError::InvalidBundleId(_))
        ));
    }

    #[test]
    fn test_success_response_drops_status_header() {
        let mut raw = b"Status: 201 Created\r\nX-Custom: yes\r\n\r\n".to_vec();
        raw.extend_from_slice(b"payload");
        let out = classify(&result(&raw, b""), MissingTerminatorPolicy::Reject).unwrap();
        let response = out.into_response();
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("status").is_none());
        assert_eq!(response.headers().get("x-custom").unwrap(), "yes");
    }

    #[test]
    fn test_success_response_relays_non_ascii_header_values() {
        let raw = "X-Repo-Title: Café Données\r\n\r\nok".as_bytes();
        let out = classify(&result(raw, b""), MissingTerminatorPolicy::Reject).unwrap();
        let response = out.into_response();
        assert_eq!(
            response.headers().get("x-repo-title").unwrap().as_bytes(),
            "Café Données".as_bytes()
        );
    }
}
