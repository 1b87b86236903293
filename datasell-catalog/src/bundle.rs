use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provider volume used when a label is not in the catalog.
pub const DEFAULT_VOLUME_MB: u32 = 1024;

/// Data bundle sizes sold in the storefront
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BundleLabel {
    #[serde(rename = "100MB")]
    Mb100,
    #[serde(rename = "300MB")]
    Mb300,
    #[serde(rename = "500MB")]
    Mb500,
    #[serde(rename = "1GB")]
    Gb1,
    #[serde(rename = "2GB")]
    Gb2,
    #[serde(rename = "3GB")]
    Gb3,
    #[serde(rename = "4GB")]
    Gb4,
    #[serde(rename = "5GB")]
    Gb5,
    #[serde(rename = "10GB")]
    Gb10,
}

impl BundleLabel {
    pub const ALL: [BundleLabel; 9] = [
        BundleLabel::Mb100,
        BundleLabel::Mb300,
        BundleLabel::Mb500,
        BundleLabel::Gb1,
        BundleLabel::Gb2,
        BundleLabel::Gb3,
        BundleLabel::Gb4,
        BundleLabel::Gb5,
        BundleLabel::Gb10,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BundleLabel::Mb100 => "100MB",
            BundleLabel::Mb300 => "300MB",
            BundleLabel::Mb500 => "500MB",
            BundleLabel::Gb1 => "1GB",
            BundleLabel::Gb2 => "2GB",
            BundleLabel::Gb3 => "3GB",
            BundleLabel::Gb4 => "4GB",
            BundleLabel::Gb5 => "5GB",
            BundleLabel::Gb10 => "10GB",
        }
    }

    /// Volume in the provider's unit (megabytes, 1GB = 1024).
    pub fn volume_mb(&self) -> u32 {
        match self {
            BundleLabel::Mb100 => 100,
            BundleLabel::Mb300 => 300,
            BundleLabel::Mb500 => 500,
            BundleLabel::Gb1 => 1024,
            BundleLabel::Gb2 => 2048,
            BundleLabel::Gb3 => 3072,
            BundleLabel::Gb4 => 4096,
            BundleLabel::Gb5 => 5120,
            BundleLabel::Gb10 => 10240,
        }
    }
}

impl fmt::Display for BundleLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown data bundle: {0}")]
pub struct UnknownBundle(pub String);

impl FromStr for BundleLabel {
    type Err = UnknownBundle;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BundleLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s)
            .ok_or_else(|| UnknownBundle(s.to_string()))
    }
}

/// Provider volume for a raw label.
///
/// Labels outside the catalog resolve to [`DEFAULT_VOLUME_MB`] instead of
/// failing, so a storefront catalog that drifts ahead of this list still
/// produces a request.
pub fn volume_for_bundle(label: &str) -> u32 {
    label
        .parse::<BundleLabel>()
        .map(|bundle| bundle.volume_mb())
        .unwrap_or(DEFAULT_VOLUME_MB)
}
