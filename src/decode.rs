//! Value decoding
//!
//! Server version numbers, extension version strings and unit-suffixed
//! setting values.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Dotted numeric version whose components may carry a hyphenated suffix,
/// e.g. `1.0`, `2-beta`, `1.2-3`
static EXTENSION_VERSION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(-+[0-9A-Za-z]+)?(\.[0-9]+(-+[0-9A-Za-z]+)?)*$")
        .expect("static pattern is valid")
});

/// Server version
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerVersion {
    pub major: u32,
    pub minor: u32,
    /// Only present on servers before 10, which use a three-part version
    pub patch: Option<u32>,
    pub full: String,
    /// Output of `SELECT version()`
    pub raw: String,
}

impl ServerVersion {
    /// Decode `server_version_num` (`MMmmpp`).
    ///
    /// From 10 on the middle pair is always `00` and the release number is
    /// the last pair, so `130002` is 13.2. That release number is reported
    /// as `minor` and `patch` is left empty.
    pub fn from_num(num: u32, raw: String) -> Self {
        let major = num / 10000;
        let minor = num / 100 % 100;
        let patch = num % 100;

        if minor == 0 {
            Self {
                major,
                minor: patch,
                patch: None,
                full: format!("{}.{}", major, patch),
                raw,
            }
        } else {
            Self {
                major,
                minor,
                patch: Some(patch),
                full: format!("{}.{}.{}", major, minor, patch),
                raw,
            }
        }
    }
}

/// Extension version, split best-effort
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionVersion {
    pub major: Option<u32>,
    pub minor: Option<u32>,
    pub raw: String,
}

impl ExtensionVersion {
    pub fn parse(raw: &str) -> Self {
        let (major, minor) = if EXTENSION_VERSION.is_match(raw) {
            let mut parts = raw.split('.').map(component_number);
            (parts.next().flatten(), parts.next().flatten())
        } else {
            (None, None)
        };

        Self {
            major,
            minor,
            raw: raw.to_string(),
        }
    }
}

/// Numeric part of a version component, without any `-suffix`
fn component_number(component: &str) -> Option<u32> {
    component.split('-').next()?.parse().ok()
}

/// Byte multiplier for a `pg_settings.unit`
pub fn unit_factor(unit: &str) -> Option<i64> {
    match unit {
        "kB" => Some(1024),
        "8kB" => Some(8 * 1024),
        "MB" => Some(1024 * 1024),
        _ => None,
    }
}

/// Setting value in bytes, if its unit is a size unit.
///
/// Negative results (`-1` style sentinels) are reported as 0.
pub fn value_in_bytes(setting: &str, unit: &str) -> Option<i64> {
    let factor = unit_factor(unit)?;
    let value: i64 = setting.trim().parse().ok()?;
    Some(value.saturating_mul(factor).max(0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modern_server_version() {
        let version = ServerVersion::from_num(130002, "PostgreSQL 13.2".to_string());

        assert_eq!(version.major, 13);
        assert_eq!(version.minor, 2);
        assert_eq!(version.patch, None);
        assert_eq!(version.full, "13.2");
        assert_eq!(version.raw, "PostgreSQL 13.2");
    }

    #[test]
    fn test_legacy_server_version() {
        let version = ServerVersion::from_num(90605, String::new());

        assert_eq!(version.major, 9);
        assert_eq!(version.minor, 6);
        assert_eq!(version.patch, Some(5));
        assert_eq!(version.full, "9.6.5");
    }

    #[test]
    fn test_first_modern_release() {
        let version = ServerVersion::from_num(100000, String::new());

        assert_eq!(version.major, 10);
        assert_eq!(version.minor, 0);
        assert_eq!(version.patch, None);
        assert_eq!(version.full, "10.0");
    }

    #[test]
    fn test_extension_version_plain() {
        let version = ExtensionVersion::parse("1.0");
        assert_eq!(version.major, Some(1));
        assert_eq!(version.minor, Some(0));
        assert_eq!(version.raw, "1.0");

        let version = ExtensionVersion::parse("1.2.3");
        assert_eq!((version.major, version.minor), (Some(1), Some(2)));
    }

    #[test]
    fn test_extension_version_with_suffix() {
        let version = ExtensionVersion::parse("2-beta");
        assert_eq!(version.major, Some(2));
        assert_eq!(version.minor, None);
        assert_eq!(version.raw, "2-beta");

        let version = ExtensionVersion::parse("1.4-1");
        assert_eq!((version.major, version.minor), (Some(1), Some(4)));
    }

    #[test]
    fn test_extension_version_unparseable() {
        for raw in ["unpackaged", "1.2beta", "", "v1.0"] {
            let version = ExtensionVersion::parse(raw);
            assert_eq!(version.major, None, "{}", raw);
            assert_eq!(version.minor, None, "{}", raw);
            assert_eq!(version.raw, raw);
        }
    }

    #[test]
    fn test_value_in_bytes() {
        assert_eq!(value_in_bytes("4096", "kB"), Some(4194304));
        assert_eq!(value_in_bytes("16384", "8kB"), Some(134217728));
        assert_eq!(value_in_bytes("64", "MB"), Some(67108864));
        assert_eq!(value_in_bytes("-1", "kB"), Some(0));
    }

    #[test]
    fn test_value_in_bytes_unknown_unit() {
        assert_eq!(value_in_bytes("200", "ms"), None);
        assert_eq!(value_in_bytes("on", ""), None);
        assert_eq!(value_in_bytes("1.5", "kB"), None);
    }
}
