//! Format driver descriptors.
//!
//! A driver describes one input format the viewer knows about: the file extensions that
//! select it, whether it can be loaded from a local file, from a URL, or written on export,
//! and, for formats the viewer cannot read, the hint shown to the user instead.

use std::fmt;

/// Whether a driver takes part in one kind of operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    Supported,
    NotSupported,
}

impl SupportStatus {
    #[must_use]
    pub fn is_supported(self) -> bool {
        self == SupportStatus::Supported
    }
}

impl fmt::Display for SupportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SupportStatus::Supported => "yes",
            SupportStatus::NotSupported => "no",
        })
    }
}

/// Operations a driver can take part in.
#[derive(Debug, Clone, Copy)]
pub struct DriverCapabilities {
    /// Loading a file from the local filesystem.
    pub local: SupportStatus,
    /// Loading from an `http(s)` URL.
    pub remote: SupportStatus,
    /// Writing the current dataset back out.
    pub export: SupportStatus,
}

impl DriverCapabilities {
    /// Returns `true` if the driver can be loaded from at least one kind of location.
    #[must_use]
    pub fn can_load(&self) -> bool {
        self.local.is_supported() || self.remote.is_supported()
    }
}

/// Geospatial input format definition.
#[derive(Debug, Clone)]
pub struct Driver {
    /// Short name used in the CLI and for driver identification (e.g., `"GeoJSON"`).
    pub short_name: &'static str,
    /// Long descriptive name for display purposes.
    pub long_name: &'static str,
    /// Lower-case file extensions, without the leading dot, that select this driver.
    pub extensions: &'static [&'static str],
    /// Operations supported by this driver.
    pub capabilities: DriverCapabilities,
    /// What the user should do instead when the format cannot be loaded.
    pub remediation: Option<&'static str>,
}

impl Driver {
    /// Creates a driver that can be loaded.
    #[must_use]
    pub const fn new(
        short_name: &'static str,
        long_name: &'static str,
        extensions: &'static [&'static str],
        local: SupportStatus,
        remote: SupportStatus,
        export: SupportStatus,
    ) -> Self {
        Self {
            short_name,
            long_name,
            extensions,
            capabilities: DriverCapabilities {
                local,
                remote,
                export,
            },
            remediation: None,
        }
    }

    /// Creates a driver the viewer recognizes but refuses, with a remediation hint.
    #[must_use]
    pub const fn unsupported(
        short_name: &'static str,
        long_name: &'static str,
        extensions: &'static [&'static str],
        remediation: &'static str,
    ) -> Self {
        Self {
            short_name,
            long_name,
            extensions,
            capabilities: DriverCapabilities {
                local: SupportStatus::NotSupported,
                remote: SupportStatus::NotSupported,
                export: SupportStatus::NotSupported,
            },
            remediation: Some(remediation),
        }
    }

    /// Returns `true` if `extension` (case-insensitive, with or without a dot) selects this driver.
    #[must_use]
    pub fn matches_extension(&self, extension: &str) -> bool {
        let extension = extension.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|candidate| candidate.eq_ignore_ascii_case(extension))
    }
}
