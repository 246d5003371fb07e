//! Engine/strategy semantic-version compatibility gate (spec.md §4.6 step 3).
//!
//! No `semver` dependency appears anywhere in the retrieval pack, so this is
//! a deliberately small hand-rolled parser for the `major.minor.patch` shape
//! the spec's version gate actually needs — not a general semver
//! implementation.

use std::fmt;

/// A parsed `major.minor.patch` version, or the special `"main"` sentinel
/// that bypasses compatibility checking on either side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineVersion {
    Main,
    Semver { major: u64, minor: u64, patch: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("invalid version string: {0}")]
    Malformed(String),
}

impl EngineVersion {
    pub fn parse(s: &str) -> Result<Self, VersionParseError> {
        if s == "main" {
            return Ok(EngineVersion::Main);
        }
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(VersionParseError::Malformed(s.to_string()));
        }
        let mut nums = [0u64; 3];
        for (i, part) in parts.iter().enumerate() {
            nums[i] = part
                .parse()
                .map_err(|_| VersionParseError::Malformed(s.to_string()))?;
        }
        Ok(EngineVersion::Semver {
            major: nums[0],
            minor: nums[1],
            patch: nums[2],
        })
    }

    /// Compatibility rule (spec.md §4.6): major and minor must match; a
    /// `"main"` on either side bypasses the check entirely.
    pub fn is_compatible_with(&self, other: &EngineVersion) -> bool {
        match (self, other) {
            (EngineVersion::Main, _) | (_, EngineVersion::Main) => true,
            (
                EngineVersion::Semver { major: am, minor: an, .. },
                EngineVersion::Semver { major: bm, minor: bn, .. },
            ) => am == bm && an == bn,
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineVersion::Main => write!(f, "main"),
            EngineVersion::Semver { major, minor, patch } => write!(f, "{major}.{minor}.{patch}"),
        }
    }
}
