use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Ownership source platforms: the storefront plus the offline-export
/// formats users report their libraries from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformTag {
    Steam,
    Gog,
    Epic,
    Amazon,
}

impl PlatformTag {
    pub const ALL: [PlatformTag; 4] = [
        PlatformTag::Steam,
        PlatformTag::Gog,
        PlatformTag::Epic,
        PlatformTag::Amazon,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlatformTag::Steam => "steam",
            PlatformTag::Gog => "gog",
            PlatformTag::Epic => "epic",
            PlatformTag::Amazon => "amazon",
        }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlatformTag {
    type Err = UnknownPlatform;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "steam" => Ok(PlatformTag::Steam),
            "gog" => Ok(PlatformTag::Gog),
            "epic" | "epic_games" | "egs" => Ok(PlatformTag::Epic),
            "amazon" | "amazon_games" => Ok(PlatformTag::Amazon),
            _ => Err(UnknownPlatform(raw.trim().to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UnknownPlatform(pub String);

impl fmt::Display for UnknownPlatform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown platform tag: {}", self.0)
    }
}

impl std::error::Error for UnknownPlatform {}

/// Metadata platform labels the provider reports for the PC family.
/// The consumer-facing filter value "PC" is synthetic and expands to the
/// union of these before matching.
pub const PC_FAMILY: [&str; 3] = ["PC (Microsoft Windows)", "Mac", "Linux"];

/// Whether a provider platform label belongs to the PC family.
pub fn is_pc_family(label: &str) -> bool {
    let lowered = label.trim().to_ascii_lowercase();
    lowered == "pc"
        || PC_FAMILY
            .iter()
            .any(|member| member.eq_ignore_ascii_case(lowered.as_str()))
}

/// Expand one search filter value into the concrete labels to match against
/// stored metadata platforms. Non-synthetic values pass through unchanged.
pub fn expand_platform_filter(value: &str) -> Vec<String> {
    if value.trim().eq_ignore_ascii_case("pc") {
        PC_FAMILY.iter().map(|s| s.to_string()).collect()
    } else {
        vec![value.trim().to_string()]
    }
}

/// Group a distinct-platform list for filter options: PC-family members
/// collapse into a single synthetic "PC" entry, everything else is kept.
pub fn collapse_pc_family<I, S>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    let mut saw_pc = false;
    for label in labels {
        let label = label.as_ref().trim();
        if label.is_empty() {
            continue;
        }
        if is_pc_family(label) {
            saw_pc = true;
        } else if !out.iter().any(|existing| existing == label) {
            out.push(label.to_string());
        }
    }
    out.sort();
    if saw_pc {
        out.insert(0, "PC".to_string());
    }
    out
}
