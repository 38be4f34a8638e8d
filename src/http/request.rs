//! HTTP request parsing and representation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use crate::dispatch::{Context, ContextKey};
use crate::http::error::ParseError;

/// Supported HTTP protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
    Http10,
    Http11,
    Http20,
}

impl FromStr for HttpVersion {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "HTTP/1.0" => Ok(HttpVersion::Http10),
            "HTTP/1.1" => Ok(HttpVersion::Http11),
            "HTTP/2" | "HTTP/2.0" => Ok(HttpVersion::Http20),
            _ => Err(ParseError::InvalidVersion(s.to_string())),
        }
    }
}

impl fmt::Display for HttpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HttpVersion::Http10 => "HTTP/1.0",
            HttpVersion::Http11 => "HTTP/1.1",
            HttpVersion::Http20 => "HTTP/2",
        })
    }
}

/// Represents an HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The method token, compared verbatim by the dispatcher
    pub method: String,
    /// The percent-decoded request path, without the query string
    pub path: String,
    /// The HTTP version
    pub version: HttpVersion,
    /// The HTTP headers
    pub headers: HashMap<String, String>,
    /// The request body
    pub body: Vec<u8>,
    /// Query parameters parsed from the request target
    pub query_params: HashMap<String, String>,
}

struct HttpRequestKey;

impl ContextKey for HttpRequestKey {
    type Value = HttpRequest;
}

impl HttpRequest {
    /// Get a header value, ignoring the case of the name.
    pub fn get_header(&self, name: &str) -> Option<&String> {
        self.headers
            .iter()
            .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v))
    }

    pub fn has_header(&self, name: &str) -> bool {
        self.get_header(name).is_some()
    }

    pub fn get_query_param(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }

    /// Derive a child of `parent` carrying this request.
    pub fn into_context(self, parent: &Context) -> Context {
        parent.with_value::<HttpRequestKey>(self)
    }

    /// The inbound request stored in `ctx` by the HTTP server, if any.
    pub fn from_context(ctx: &Context) -> Option<&HttpRequest> {
        ctx.value::<HttpRequestKey>()
    }
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "!#$%&'*+-.^_`|~".contains(c)
}

/// Decode form-encoded query parameters; later duplicates win.
fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Percent-decode the path part of the request target.
fn decode_path(path: &str) -> Result<String, ParseError> {
    percent_decode_str(path)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| ParseError::InvalidPath)
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Parse an HTTP request from a byte slice.
///
/// Returns [`ParseError::Incomplete`] while the request line, the header block
/// or the `Content-Length` bytes of body have not fully arrived.
pub fn parse_request(input: &[u8]) -> Result<HttpRequest, ParseError> {
    if input.is_empty() {
        return Err(ParseError::EmptyRequest);
    }

    let line_end = input.iter().position(|&b| b == b'\n').ok_or(ParseError::Incomplete)?;
    let request_line = std::str::from_utf8(&input[..line_end])
        .map_err(|_| ParseError::MalformedRequestLine("Invalid UTF-8".to_string()))?
        .trim_end_matches('\r');

    // Split the request line into method, target, and version
    let parts: Vec<&str> = request_line.split_whitespace().collect();
    let [method, target, version] = parts[..] else {
        return Err(ParseError::MalformedRequestLine(request_line.to_string()));
    };

    if !method.chars().all(is_token_char) {
        return Err(ParseError::InvalidMethod(method.to_string()));
    }
    if !target.starts_with('/') {
        return Err(ParseError::InvalidPath);
    }
    let version = HttpVersion::from_str(version)?;

    let (head_end, body_start) = match find_subsequence(input, b"\r\n\r\n") {
        Some(pos) => (pos, pos + 4),
        None => {
            let pos = find_subsequence(input, b"\n\n").ok_or(ParseError::Incomplete)?;
            (pos, pos + 2)
        }
    };
    let head = std::str::from_utf8(&input[line_end + 1..head_end.max(line_end + 1)])
        .map_err(|_| ParseError::InvalidHeaderFormat)?;

    let mut headers = HashMap::new();
    for line in head.lines().filter(|line| !line.is_empty()) {
        let (name, value) = line.split_once(':').ok_or(ParseError::InvalidHeaderFormat)?;
        headers.insert(name.trim().to_string(), value.trim().to_string());
    }

    let (path, query_params) = match target.split_once('?') {
        Some((path, query)) => (decode_path(path)?, parse_query(query)),
        None => (decode_path(target)?, HashMap::new()),
    };

    let mut request = HttpRequest {
        method: method.to_string(),
        path,
        version,
        headers,
        body: Vec::new(),
        query_params,
    };

    if version == HttpVersion::Http11 && !request.has_header("Host") {
        return Err(ParseError::MissingHeader("Host".to_string()));
    }

    let content_length = match request.get_header("Content-Length") {
        Some(value) => value
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidContentLength(value.clone()))?,
        None => 0,
    };
    let available = &input[body_start..];
    if available.len() < content_length {
        return Err(ParseError::Incomplete);
    }
    request.body = available[..content_length].to_vec();

    Ok(request)
}
