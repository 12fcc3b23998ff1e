use std::net::IpAddr;
use thiserror::Error;
use url::{Host, Url};

/// Reasons a feed URL is refused by `addfeed`.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    /// Loopback, private, link-local or unspecified address
    #[error("Internal address not allowed: {0}")]
    InternalHost(String),
}

/// Validates a URL before it is stored as a feed.
///
/// Only `http`/`https` URLs with a host are accepted. Hosts that resolve to
/// the local machine or a private network by literal (`localhost`, `127.0.0.1`,
/// `10.0.0.0/8`, `fe80::/10`, ...) are rejected so the poller cannot be
/// pointed at internal services.
///
/// ```
/// use gator::util::validate_url;
///
/// assert!(validate_url("https://blog.boot.dev/index.xml").is_ok());
/// assert!(validate_url("http://localhost:8080/rss").is_err());
/// assert!(validate_url("ftp://example.com/feed").is_err());
/// ```
pub fn validate_url(raw: &str) -> Result<Url, UrlValidationError> {
    let url = Url::parse(raw.trim())?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlValidationError::UnsupportedScheme(url.scheme().to_owned()));
    }

    let internal = match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            domain.eq_ignore_ascii_case("localhost") || domain.ends_with(".localhost")
        }
        Some(Host::Ipv4(ip)) => is_internal_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_internal_ip(IpAddr::V6(ip)),
    };

    if internal {
        let host = url.host_str().unwrap_or_default().to_owned();
        return Err(UrlValidationError::InternalHost(host));
    }

    Ok(url)
}

fn is_internal_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback() || v4.is_private() || v4.is_link_local() || v4.is_unspecified()
        }
        IpAddr::V6(v6) => {
            if let Some(mapped) = v6.to_ipv4_mapped() {
                return is_internal_ip(IpAddr::V4(mapped));
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (first & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (first & 0xffc0) == 0xfe80
        }
    }
}
