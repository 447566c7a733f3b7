//! Endpoint descriptors and connection-URL construction.
//!
//! URLs are assembled as plain strings so that the scheme, path and query
//! handed to the recorder are exactly what the caller described.  The `url`
//! crate is only used to validate the result and to percent-encode
//! credentials.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::UrlError;

/// Structured description of a network media source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointDescriptor {
    pub protocol: String,
    pub host: String,
    /// `None` or `Some(0)` omits the port from the authority.
    #[serde(default)]
    pub port: Option<u16>,
    /// A leading `/` is added when missing.
    #[serde(default)]
    pub path: String,
    /// Emitted in insertion order.
    #[serde(default)]
    pub query: IndexMap<String, String>,
}

/// Credentials embedded into the URL authority.
///
/// Basic and digest are embedded identically; the distinction is carried
/// through for the recorder's benefit only.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Credentials {
    #[default]
    None,
    Basic { username: String, password: String },
    Digest { username: String, password: String },
}

impl Credentials {
    /// Username and password, if any are to be embedded.
    pub fn user_pass(&self) -> Option<(&str, &str)> {
        match self {
            Self::None => None,
            Self::Basic { username, password } | Self::Digest { username, password } => {
                Some((username, password))
            }
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}:***)"),
            Self::Digest { username, .. } => write!(f, "Digest({username}:***)"),
        }
    }
}

/// Compose `protocol://host[:port]/path[?query]` from an endpoint.
pub fn build_url(endpoint: &EndpointDescriptor) -> Result<String, UrlError> {
    validate_protocol(&endpoint.protocol)?;
    validate_host(&endpoint.host)?;
    if endpoint.path.contains(['?', '#']) {
        return Err(UrlError::InvalidPath(endpoint.path.clone()));
    }

    let mut url = format!("{}://{}", endpoint.protocol, endpoint.host);
    if let Some(port) = endpoint.port.filter(|p| *p != 0) {
        url.push(':');
        url.push_str(&port.to_string());
    }
    if !endpoint.path.starts_with('/') {
        url.push('/');
    }
    url.push_str(&endpoint.path);

    if !endpoint.query.is_empty() {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(endpoint.query.iter())
            .finish();
        url.push('?');
        url.push_str(&query);
    }

    Url::parse(&url).map_err(|e| UrlError::Unparseable {
        url: url.clone(),
        reason: e.to_string(),
    })?;
    Ok(url)
}

/// Rewrite the authority of `url` to `username:password@host[:port]`.
///
/// Any credentials already present are replaced.  Everything outside the
/// authority is copied byte for byte.
pub fn insert_credentials(url: &str, username: &str, password: &str) -> Result<String, UrlError> {
    let (start, end) =
        authority_bounds(url).ok_or_else(|| UrlError::MissingAuthority(redact(url)))?;
    let authority = &url[start..end];
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
    if host_port.is_empty() || host_port.starts_with(':') {
        return Err(UrlError::EmptyHost);
    }

    // Let `url` do the userinfo percent-encoding.
    let mut parsed = Url::parse(url).map_err(|e| UrlError::Unparseable {
        url: redact(url),
        reason: e.to_string(),
    })?;
    parsed
        .set_username(username)
        .map_err(|()| UrlError::InvalidHost(host_port.to_string()))?;
    parsed
        .set_password(Some(password))
        .map_err(|()| UrlError::InvalidHost(host_port.to_string()))?;

    Ok(format!(
        "{}{}:{}@{}{}",
        &url[..start],
        parsed.username(),
        parsed.password().unwrap_or_default(),
        host_port,
        &url[end..]
    ))
}

/// Build the URL for an endpoint and embed credentials when present.
pub fn connection_url(
    endpoint: &EndpointDescriptor,
    credentials: &Credentials,
) -> Result<String, UrlError> {
    let url = build_url(endpoint)?;
    match credentials.user_pass() {
        Some((username, password)) => insert_credentials(&url, username, password),
        None => Ok(url),
    }
}

/// Mask the password of a URL for logging.
pub fn redact(url: &str) -> String {
    let Some((start, end)) = authority_bounds(url) else {
        return url.to_string();
    };
    match url[start..end].rsplit_once('@') {
        Some((userinfo, host_port)) => {
            let user = match userinfo.split_once(':') {
                Some((user, _)) => format!("{user}:***"),
                None => userinfo.to_string(),
            };
            format!("{}{}@{}{}", &url[..start], user, host_port, &url[end..])
        }
        None => url.to_string(),
    }
}

/// Byte range of the authority: just after `://` up to the first `/`, `?`
/// or `#`.
fn authority_bounds(url: &str) -> Option<(usize, usize)> {
    let start = url.find("://")? + 3;
    let end = url[start..]
        .find(|c| matches!(c, '/' | '?' | '#'))
        .map_or(url.len(), |i| start + i);
    Some((start, end))
}

fn validate_protocol(protocol: &str) -> Result<(), UrlError> {
    let mut chars = protocol.chars();
    match chars.next() {
        None => Err(UrlError::EmptyProtocol),
        Some(first)
            if first.is_ascii_alphabetic()
                && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) =>
        {
            Ok(())
        }
        Some(_) => Err(UrlError::InvalidProtocol(protocol.to_string())),
    }
}

fn validate_host(host: &str) -> Result<(), UrlError> {
    if host.is_empty() {
        return Err(UrlError::EmptyHost);
    }
    let bad_char = host
        .chars()
        .any(|c| c.is_whitespace() || c.is_control() || matches!(c, '/' | '?' | '#' | '@'));
    // A colon is only legal inside a bracketed IPv6 literal.
    let bare_colon = host.contains(':') && !(host.starts_with('[') && host.ends_with(']'));
    if bad_char || bare_colon {
        return Err(UrlError::InvalidHost(host.to_string()));
    }
    Ok(())
}

// ─── tests ───────────────────────────────────────────────────────────────
