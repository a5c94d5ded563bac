//! Device profile presets mapping a profile name to viewport dimensions.
//!
//! The table is built once at startup and shared read-only between the
//! validator and the capture engine. The `full` profile is not an error:
//! it resolves to the full-page sentinel, meaning no fixed viewport is
//! applied and screenshots cover the whole page height.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Viewport resolved from a device profile.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum Viewport {
    /// Fixed window dimensions in CSS pixels.
    Fixed {
        width: u32,
        height: u32,
        device_scale_factor: f64,
        mobile: bool,
    },
    /// No fixed viewport; capture the entire page height.
    FullPage,
}

impl Viewport {
    pub fn is_full_page(&self) -> bool {
        matches!(self, Viewport::FullPage)
    }

    /// Fixed dimensions, if any.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            Viewport::Fixed { width, height, .. } => Some((*width, *height)),
            Viewport::FullPage => None,
        }
    }
}

/// A named viewport preset.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceProfile {
    pub name: &'static str,
    pub viewport: Viewport,
}

/// Immutable lookup table from profile name to [`DeviceProfile`].
///
/// Constructed once by [`DeviceProfileTable::builtin`] and never mutated.
#[derive(Debug)]
pub struct DeviceProfileTable {
    profiles: HashMap<&'static str, DeviceProfile>,
}

/// Profile name used when a request does not specify one.
pub const DEFAULT_DEVICE: &str = "desktop";

impl DeviceProfileTable {
    /// The built-in preset set: phone, tablet, laptop, desktop, full.
    pub fn builtin() -> Self {
        let presets = [
            ("phone", fixed(375, 667, 2.0, true)),
            ("tablet", fixed(768, 1024, 2.0, true)),
            ("laptop", fixed(1366, 768, 1.0, false)),
            ("desktop", fixed(1920, 1080, 1.0, false)),
            ("full", Viewport::FullPage),
        ];

        let profiles = presets
            .into_iter()
            .map(|(name, viewport)| (name, DeviceProfile { name, viewport }))
            .collect();

        Self { profiles }
    }

    /// Pure lookup; `None` means the name is not a known profile.
    pub fn resolve(&self, name: &str) -> Option<&DeviceProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names, for error messages and CLI help.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.profiles.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

fn fixed(width: u32, height: u32, device_scale_factor: f64, mobile: bool) -> Viewport {
    Viewport::Fixed {
        width,
        height,
        device_scale_factor,
        mobile,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_profiles() {
        let table = DeviceProfileTable::builtin();

        let phone = table.resolve("phone").unwrap();
        assert_eq!(phone.viewport.dimensions(), Some((375, 667)));

        let desktop = table.resolve("desktop").unwrap();
        assert_eq!(desktop.viewport.dimensions(), Some((1920, 1080)));

        assert!(table.resolve(DEFAULT_DEVICE).is_some());
    }

    #[test]
    fn test_full_resolves_to_sentinel_not_error() {
        let table = DeviceProfileTable::builtin();
        let full = table.resolve("full").unwrap();
        assert!(full.viewport.is_full_page());
        assert_eq!(full.viewport.dimensions(), None);
    }

    #[test]
    fn test_unknown_profile() {
        let table = DeviceProfileTable::builtin();
        assert!(table.resolve("watch").is_none());
        assert!(!table.contains("Desktop")); // names are case-sensitive
    }
}
