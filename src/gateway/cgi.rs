//! CGI environment construction and CGI response parsing.

use std::collections::HashMap;
use std::path::Path;

use axum::http::{HeaderMap, Method, header};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// The request data that crosses into the CGI child.
#[derive(Debug, Clone)]
pub struct CgiRequest<'a> {
    pub method: &'a Method,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    /// Length of the body that will be written to stdin (after inflation).
    pub content_length: usize,
}

/// Build the CGI variables consumed by `git-http-backend`.
pub fn build_environment(
    request: &CgiRequest<'_>,
    repository_root: &Path,
    path_suffix: &str,
) -> HashMap<String, String> {
    let content_type = request
        .headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let mut env = HashMap::new();
    env.insert("REQUEST_METHOD".to_string(), request.method.as_str().to_string());
    env.insert("GIT_HTTP_EXPORT_ALL".to_string(), "yes".to_string());
    env.insert(
        "GIT_PROJECT_ROOT".to_string(),
        repository_root.to_string_lossy().into_owned(),
    );
    env.insert(
        "PATH_INFO".to_string(),
        format!("/{}", path_suffix.trim_start_matches('/')),
    );
    env.insert(
        "QUERY_STRING".to_string(),
        request.query.unwrap_or("").to_string(),
    );
    env.insert("CONTENT_TYPE".to_string(), content_type.to_string());
    if request.content_length > 0 {
        env.insert(
            "CONTENT_LENGTH".to_string(),
            request.content_length.to_string(),
        );
    }
    env
}

/// What to do with CGI output that has no blank line after its headers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissingTerminatorPolicy {
    /// Treat as a protocol error.
    #[default]
    Reject,
    /// Empty headers; the whole output is the body.
    TreatAsBody,
}

impl std::fmt::Display for MissingTerminatorPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MissingTerminatorPolicy::Reject => write!(f, "reject"),
            MissingTerminatorPolicy::TreatAsBody => write!(f, "treat_as_body"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CgiParseError {
    #[error("no blank line after headers in {len} bytes of output")]
    MissingTerminator { len: usize },
}

/// Ordered CGI response headers with case-insensitive lookup.
///
/// Names keep the case the backend wrote them in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CgiHeaders {
    fields: Vec<(String, String)>,
}

impl CgiHeaders {
    /// Parse a header block, one `Name: value` per line.
    pub fn parse(block: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in block.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if line.is_empty() {
                continue;
            }
            if line.starts_with([' ', '\t']) {
                // Obsolete line folding.
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_string(), value.trim().to_string()));
            }
        }
        Self { fields }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The `Status` header split into code and reason, if well-formed.
    pub fn status(&self) -> Option<(u16, String)> {
        parse_status(self.get("status")?)
    }
}

/// Parse `"<int> <reason...>"`.
pub fn parse_status(value: &str) -> Option<(u16, String)> {
    let mut segs = value.trim().splitn(2, ' ');
    let code = segs.next()?.parse::<u16>().ok()?;
    let reason = segs.next().unwrap_or("").trim().to_string();
    Some((code, reason))
}

/// A parsed CGI response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgiResponse {
    pub headers: CgiHeaders,
    pub body: Vec<u8>,
}

/// Split raw CGI output at the first CRLFCRLF.
///
/// Bytes before the terminator are decoded as text headers; bytes after it
/// are returned untouched.
pub fn parse_response(
    output: &[u8],
    policy: MissingTerminatorPolicy,
) -> Result<CgiResponse, CgiParseError> {
    match find_terminator(output) {
        Some(end) => Ok(CgiResponse {
            headers: CgiHeaders::parse(&String::from_utf8_lossy(&output[..end])),
            body: output[end + HEADER_TERMINATOR.len()..].to_vec(),
        }),
        None => match policy {
            MissingTerminatorPolicy::Reject => {
                Err(CgiParseError::MissingTerminator { len: output.len() })
            }
            MissingTerminatorPolicy::TreatAsBody => Ok(CgiResponse {
                headers: CgiHeaders::default(),
                body: output.to_vec(),
            }),
        },
    }
}

fn find_terminator(output: &[u8]) -> Option<usize> {
    output
        .windows(HEADER_TERMINATOR.len())
        .position(|w| w == HEADER_TERMINATOR)
}
