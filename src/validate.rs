//! Request validation: URL well-formedness, blocked-host rejection, and
//! device profile resolution.
//!
//! Validation is a pure function over its inputs and the immutable device
//! table; it never acquires browser resources. Loopback and link-local
//! targets are rejected so the service can never be steered at internal
//! endpoints.

use crate::{CaptureMode, CaptureRequest, DeviceProfileTable, ValidationError, DEFAULT_DEVICE};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;
use url::{Host, Url};

pub struct RequestValidator {
    table: Arc<DeviceProfileTable>,
}

impl RequestValidator {
    pub fn new(table: Arc<DeviceProfileTable>) -> Self {
        Self { table }
    }

    /// Validate the raw `(url, device, mode, duration)` tuple handed over
    /// by the HTTP layer into a [`CaptureRequest`].
    ///
    /// Error order follows the checks: missing url, malformed url,
    /// blocked host, unknown device, invalid duration. A non-positive
    /// duration is an error, never silently defaulted; clamping to the
    /// hard ceiling happens later in the engine.
    pub fn validate(
        &self,
        raw_url: Option<&str>,
        raw_device: Option<&str>,
        mode: CaptureMode,
        raw_duration: Option<i64>,
    ) -> Result<CaptureRequest, ValidationError> {
        let raw_url = match raw_url {
            Some(url) if !url.trim().is_empty() => url,
            _ => return Err(ValidationError::MissingUrl),
        };

        let url = Url::parse(raw_url)
            .map_err(|e| ValidationError::MalformedUrl(format!("{raw_url}: {e}")))?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ValidationError::MalformedUrl(format!(
                "unsupported scheme: {}",
                url.scheme()
            )));
        }

        let host = url
            .host()
            .ok_or_else(|| ValidationError::MalformedUrl("url has no host".to_string()))?;
        if is_blocked_host(&host) {
            return Err(ValidationError::BlockedHost(host.to_string()));
        }

        let device = raw_device.unwrap_or(DEFAULT_DEVICE);
        let profile = self
            .table
            .resolve(device)
            .ok_or_else(|| ValidationError::UnknownDevice(device.to_string()))?;

        let duration = match raw_duration {
            Some(secs) if secs <= 0 => return Err(ValidationError::InvalidDuration(secs)),
            Some(secs) => Some(Duration::from_secs(secs as u64)),
            None => None,
        };

        Ok(CaptureRequest {
            id: uuid::Uuid::new_v4().to_string(),
            url,
            device: profile.name.to_string(),
            viewport: profile.viewport.clone(),
            mode,
            duration,
        })
    }
}

/// Loopback, link-local and unspecified addresses are off limits, as is
/// the `localhost` name. Redirect targets are not re-checked during
/// navigation; only the initial request host is covered.
fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Domain(name) => name.eq_ignore_ascii_case("localhost"),
        Host::Ipv4(addr) => is_blocked_ipv4(addr),
        Host::Ipv6(addr) => is_blocked_ipv6(addr),
    }
}

fn is_blocked_ipv4(addr: &Ipv4Addr) -> bool {
    addr.is_loopback() || addr.is_link_local() || addr.is_unspecified()
}

fn is_blocked_ipv6(addr: &Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    // fe80::/10 link-local unicast
    if (addr.segments()[0] & 0xffc0) == 0xfe80 {
        return true;
    }
    // IPv4-mapped addresses carry their IPv4 semantics
    match addr.to_ipv4_mapped() {
        Some(v4) => is_blocked_ipv4(&v4),
        None => false,
    }
}

/// Standalone host check for callers that only hold an address.
pub fn is_blocked_addr(addr: &IpAddr) -> bool {
    match addr {
        IpAddr::V4(v4) => is_blocked_ipv4(v4),
        IpAddr::V6(v6) => is_blocked_ipv6(v6),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Viewport;

    fn validator() -> RequestValidator {
        RequestValidator::new(Arc::new(DeviceProfileTable::builtin()))
    }

    #[test]
    fn test_missing_url() {
        let v = validator();
        assert_eq!(
            v.validate(None, None, CaptureMode::Screenshot, None),
            Err(ValidationError::MissingUrl)
        );
        assert_eq!(
            v.validate(Some("  "), None, CaptureMode::Screenshot, None),
            Err(ValidationError::MissingUrl)
        );
    }

    #[test]
    fn test_malformed_url() {
        let v = validator();
        assert!(matches!(
            v.validate(Some("not a url"), None, CaptureMode::Screenshot, None),
            Err(ValidationError::MalformedUrl(_))
        ));
        assert!(matches!(
            v.validate(Some("ftp://example.com"), None, CaptureMode::Screenshot, None),
            Err(ValidationError::MalformedUrl(_))
        ));
    }

    #[test]
    fn test_blocked_hosts() {
        let v = validator();
        for url in [
            "http://localhost/admin",
            "http://127.0.0.1",
            "http://127.0.0.53:9090/metrics",
            "http://0.0.0.0:8080",
            "http://[::1]/",
            "http://169.254.169.254/latest/meta-data",
        ] {
            assert!(
                matches!(
                    v.validate(Some(url), None, CaptureMode::Screenshot, None),
                    Err(ValidationError::BlockedHost(_))
                ),
                "{url} should be blocked"
            );
        }
    }

    #[test]
    fn test_unknown_device() {
        let v = validator();
        assert_eq!(
            v.validate(
                Some("https://example.com"),
                Some("watch"),
                CaptureMode::Screenshot,
                None
            ),
            Err(ValidationError::UnknownDevice("watch".to_string()))
        );
    }

    #[test]
    fn test_invalid_duration() {
        let v = validator();
        for bad in [0, -1, -30] {
            assert_eq!(
                v.validate(
                    Some("https://example.com"),
                    None,
                    CaptureMode::Recording,
                    Some(bad)
                ),
                Err(ValidationError::InvalidDuration(bad))
            );
        }
    }

    #[test]
    fn test_valid_request_resolves_viewport() {
        let v = validator();
        let request = v
            .validate(
                Some("https://example.com"),
                Some("phone"),
                CaptureMode::Screenshot,
                None,
            )
            .unwrap();

        assert_eq!(request.device, "phone");
        assert_eq!(request.viewport.dimensions(), Some((375, 667)));
        assert!(!request.viewport.is_full_page());
        assert!(!request.id.is_empty());
    }

    #[test]
    fn test_device_defaults_to_desktop() {
        let v = validator();
        let request = v
            .validate(Some("https://example.com"), None, CaptureMode::Screenshot, None)
            .unwrap();
        assert_eq!(request.device, "desktop");
        assert_eq!(request.viewport.dimensions(), Some((1920, 1080)));
    }

    #[test]
    fn test_full_profile_is_valid() {
        let v = validator();
        let request = v
            .validate(
                Some("https://example.com"),
                Some("full"),
                CaptureMode::Screenshot,
                None,
            )
            .unwrap();
        assert_eq!(request.viewport, Viewport::FullPage);
    }

    #[test]
    fn test_public_hosts_pass() {
        let v = validator();
        for url in ["https://example.com", "http://93.184.216.34", "https://sub.example.org:8443/x"] {
            assert!(
                v.validate(Some(url), None, CaptureMode::Screenshot, None).is_ok(),
                "{url} should validate"
            );
        }
    }
}
