use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use snafu::Snafu;

/// Upstream platform tag.
///
/// `Agora` is the native tag used by groups managed entirely in-house; sync
/// skips connections carrying it.
#[derive(
    Encode, Decode, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Meetup,
    Eventbrite,
    Luma,
    Agora,
}

impl Platform {
    pub const ALL: [Platform; 4] = [
        Platform::Meetup,
        Platform::Eventbrite,
        Platform::Luma,
        Platform::Agora,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Platform::Meetup => "meetup",
            Platform::Eventbrite => "eventbrite",
            Platform::Luma => "luma",
            Platform::Agora => "agora",
        }
    }

    /// Whether events for this tag originate upstream and are reconciled by
    /// sync.
    pub fn is_syncable(self) -> bool {
        !matches!(self, Platform::Agora)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(display("Unknown platform tag `{tag}`"))]
pub struct PlatformParseError {
    pub tag: String,
}

impl std::str::FromStr for Platform {
    type Err = PlatformParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "meetup" => Ok(Platform::Meetup),
            "eventbrite" => Ok(Platform::Eventbrite),
            "luma" => Ok(Platform::Luma),
            "agora" => Ok(Platform::Agora),
            other => Err(PlatformParseError {
                tag: other.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Platform;

    #[test]
    fn platform_str_round_trip() {
        for platform in Platform::ALL {
            assert_eq!(platform.as_str().parse::<Platform>(), Ok(platform));
        }
    }

    #[test]
    fn native_tag_is_not_syncable() {
        assert!(!Platform::Agora.is_syncable());
        assert!(Platform::Meetup.is_syncable());
    }
}
