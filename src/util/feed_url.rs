use std::net::{IpAddr, Ipv6Addr};
use thiserror::Error;
use url::{Host, Url};

/// Reasons a subscription URL is refused.
#[derive(Error, Debug)]
pub enum UrlValidationError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("Unsupported scheme: {0} (only http/https allowed)")]
    UnsupportedScheme(String),
    #[error("URL has no host")]
    MissingHost,
    #[error("Private IP address not allowed: {0}")]
    PrivateIp(IpAddr),
    #[error("Localhost not allowed")]
    Localhost,
}

/// Normalizes and checks a URL typed by the user before it is fetched.
///
/// Surrounding whitespace is ignored and the `feed:` pseudo-scheme used by
/// browser subscribe links is unwrapped (`feed://host/rss` becomes
/// `https://host/rss`, `feed:https://host/rss` becomes `https://host/rss`).
/// Only http and https are accepted, and hosts that resolve to this machine
/// or to private networks are refused so a stored subscription can never be
/// used to probe internal services.
///
/// ```
/// use rssfeed::util::validate_feed_url;
///
/// let url = validate_feed_url(" feed://example.com/rss.xml ").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/rss.xml");
///
/// assert!(validate_feed_url("http://localhost/feed").is_err());
/// assert!(validate_feed_url("http://192.168.1.1/feed").is_err());
/// assert!(validate_feed_url("file:///etc/passwd").is_err());
/// ```
pub fn validate_feed_url(input: &str) -> Result<Url, UrlValidationError> {
    let trimmed = input.trim();
    let unwrapped = if let Some(rest) = trimmed.strip_prefix("feed://") {
        format!("https://{}", rest)
    } else if let Some(rest) = trimmed.strip_prefix("feed:") {
        rest.to_string()
    } else {
        trimmed.to_string()
    };

    let url = Url::parse(&unwrapped)?;
    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlValidationError::UnsupportedScheme(scheme.to_owned())),
    }

    match url.host() {
        None => return Err(UrlValidationError::MissingHost),
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            if domain == "localhost" || domain.ends_with(".localhost") {
                return Err(UrlValidationError::Localhost);
            }
        }
        Some(Host::Ipv4(ip)) => check_ip(IpAddr::V4(ip))?,
        Some(Host::Ipv6(ip)) => check_ip(IpAddr::V6(ip))?,
    }

    Ok(url)
}

fn check_ip(ip: IpAddr) -> Result<(), UrlValidationError> {
    // ::ffff:a.b.c.d is judged by its embedded IPv4 address
    let ip = match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(IpAddr::V6(v6)),
        v4 => v4,
    };

    if ip.is_loopback() {
        return Err(UrlValidationError::Localhost);
    }
    let private = match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_link_local() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_unspecified() || is_local_v6(&v6),
    };
    if private {
        return Err(UrlValidationError::PrivateIp(ip));
    }
    Ok(())
}

/// Unique-local (fc00::/7) and link-local (fe80::/10) ranges.
fn is_local_v6(ip: &Ipv6Addr) -> bool {
    let first = ip.segments()[0];
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_urls_accepted() {
        assert!(validate_feed_url("https://example.com/feed.xml").is_ok());
        assert!(validate_feed_url("http://news.example.org").is_ok());
        assert!(validate_feed_url("http://8.8.8.8/rss").is_ok());
    }

    #[test]
    fn test_feed_scheme_unwrapped() {
        let url = validate_feed_url("feed://example.com/rss").unwrap();
        assert_eq!(url.as_str(), "https://example.com/rss");

        let url = validate_feed_url("feed:http://example.com/rss").unwrap();
        assert_eq!(url.as_str(), "http://example.com/rss");
    }

    #[test]
    fn test_other_schemes_rejected() {
        assert!(matches!(
            validate_feed_url("ftp://example.com"),
            Err(UrlValidationError::UnsupportedScheme(s)) if s == "ftp"
        ));
        assert!(matches!(
            validate_feed_url("feed:file:///etc/passwd"),
            Err(UrlValidationError::UnsupportedScheme(_))
        ));
    }

    #[test]
    fn test_localhost_rejected() {
        for url in [
            "http://localhost/feed",
            "http://LOCALHOST./feed",
            "http://api.localhost/feed",
            "http://127.0.0.1/feed",
            "http://[::1]/feed",
            "http://[::ffff:127.0.0.1]/feed",
        ] {
            assert!(
                matches!(validate_feed_url(url), Err(UrlValidationError::Localhost)),
                "{url} should be refused"
            );
        }
    }

    #[test]
    fn test_private_ranges_rejected() {
        for url in [
            "http://10.0.0.1/",
            "http://172.16.5.4/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data",
            "http://0.0.0.0/",
            "http://[fd00::1]/",
            "http://[fe80::1]/",
            "http://[::ffff:192.168.0.1]/",
        ] {
            assert!(
                matches!(validate_feed_url(url), Err(UrlValidationError::PrivateIp(_))),
                "{url} should be refused"
            );
        }
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(matches!(
            validate_feed_url("not a url"),
            Err(UrlValidationError::InvalidUrl(_))
        ));
    }
}
