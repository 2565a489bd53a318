use std::fmt;
use std::str::FromStr;

use crate::core::error::KernelVersionError;

/// Oldest kernel whose io_uring supports every operation the transport submits.
pub const MIN_KERNEL_VERSION: KernelVersion = KernelVersion::new(5, 9, 0);

/// Kernel release triple, e.g. `5.15.0` parsed from `5.15.0-91-generic`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct KernelVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl KernelVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// Validate a raw release string against the minimum version.
    pub fn check(release: &str) -> Result<Self, KernelVersionError> {
        let version: Self = release.parse()?;
        if version < MIN_KERNEL_VERSION {
            return Err(KernelVersionError::TooOld {
                found: release.to_string(),
                required: MIN_KERNEL_VERSION,
            });
        }
        Ok(version)
    }
}

impl fmt::Display for KernelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for KernelVersion {
    type Err = KernelVersionError;

    fn from_str(release: &str) -> Result<Self, Self::Err> {
        let malformed = || KernelVersionError::Malformed {
            release: release.to_string(),
        };

        // Only the leading digits of each component count: "15-91-generic" -> 15
        let mut parts = release.trim().splitn(3, '.').map(|part| {
            let end = part
                .find(|c: char| !c.is_ascii_digit())
                .unwrap_or(part.len());
            &part[..end]
        });

        let major = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let minor = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(malformed)?;
        let patch = match parts.next() {
            Some(p) if !p.is_empty() => p.parse().map_err(|_| malformed())?,
            _ => 0,
        };

        Ok(Self::new(major, minor, patch))
    }
}
