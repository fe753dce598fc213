//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server by its base endpoint
//! - Hold the canonical endpoint string used as the latency store key
//! - Pre-compute the pieces needed to rewrite requests onto it

use url::Url;

/// Reasons an endpoint is rejected at registration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidEndpoint {
    #[error("{endpoint:?} is not an absolute URL: {reason}")]
    Unparseable { endpoint: String, reason: String },
    #[error("{endpoint:?} uses unsupported scheme {scheme:?} (only http is proxied)")]
    UnsupportedScheme { endpoint: String, scheme: String },
    #[error("{endpoint:?} has no host")]
    MissingHost { endpoint: String },
    #[error("{endpoint:?} must not carry a query or fragment")]
    UnexpectedQuery { endpoint: String },
}

/// A single backend server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    /// Parsed base URL.
    pub url: Url,
    /// Canonical endpoint: the serialized URL without a trailing slash.
    endpoint: String,
    /// `host:port` for the request URI.
    authority: String,
}

impl Backend {
    /// Parse and validate a base endpoint such as `http://10.0.0.5:8545`.
    pub fn parse(raw: &str) -> Result<Self, InvalidEndpoint> {
        let url = Url::parse(raw).map_err(|e| InvalidEndpoint::Unparseable {
            endpoint: raw.to_string(),
            reason: e.to_string(),
        })?;

        if url.scheme() != "http" {
            return Err(InvalidEndpoint::UnsupportedScheme {
                endpoint: raw.to_string(),
                scheme: url.scheme().to_string(),
            });
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| InvalidEndpoint::MissingHost {
                endpoint: raw.to_string(),
            })?;
        if url.query().is_some() || url.fragment().is_some() {
            return Err(InvalidEndpoint::UnexpectedQuery {
                endpoint: raw.to_string(),
            });
        }

        let authority = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let endpoint = url.as_str().trim_end_matches('/').to_string();

        Ok(Self {
            url,
            endpoint,
            authority,
        })
    }

    /// Canonical endpoint string, identical to the latency store field name.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    /// Base path requests are joined onto (`/` when none was configured).
    pub fn base_path(&self) -> &str {
        self.url.path()
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_endpoint_drops_trailing_slash() {
        let b = Backend::parse("http://ms-backend:5001").unwrap();
        assert_eq!(b.endpoint(), "http://ms-backend:5001");
        assert_eq!(b.authority(), "ms-backend:5001");
        assert_eq!(b.base_path(), "/");

        let with_slash = Backend::parse("http://ms-backend:5001/").unwrap();
        assert_eq!(with_slash.endpoint(), b.endpoint());
    }

    #[test]
    fn test_base_path_is_kept() {
        let b = Backend::parse("http://10.0.0.7:8545/rpc").unwrap();
        assert_eq!(b.endpoint(), "http://10.0.0.7:8545/rpc");
        assert_eq!(b.base_path(), "/rpc");
    }

    #[test]
    fn test_default_port_has_no_explicit_port() {
        let b = Backend::parse("http://node.internal").unwrap();
        assert_eq!(b.authority(), "node.internal");
        assert_eq!(b.endpoint(), "http://node.internal");
    }

    #[test]
    fn test_rejects_bad_endpoints() {
        assert!(matches!(
            Backend::parse("ms-backend:5001"),
            Err(InvalidEndpoint::UnsupportedScheme { .. }) | Err(InvalidEndpoint::Unparseable { .. })
        ));
        assert!(matches!(
            Backend::parse("not a url"),
            Err(InvalidEndpoint::Unparseable { .. })
        ));
        assert!(matches!(
            Backend::parse("https://secure:443"),
            Err(InvalidEndpoint::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            Backend::parse("http://host:1/?x=1"),
            Err(InvalidEndpoint::UnexpectedQuery { .. })
        ));
    }
}
