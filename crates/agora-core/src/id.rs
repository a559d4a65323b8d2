//! Typed entity ids.
//!
//! Ids are 16 random bytes, displayed as unpadded base32. They are only ever
//! minted locally; upstream platform identifiers are kept as opaque strings
//! next to the [`crate::Platform`] tag and never converted into these.

use std::fmt;

/// Declare a 16-byte random id type with base32 display/parse.
#[macro_export]
macro_rules! define_id_type {
    (
        $(#[$outer:meta])*
        struct $t:tt
    ) => {
        $(#[$outer])*
        #[derive(
            ::bincode::Encode,
            ::bincode::Decode,
            Copy,
            Clone,
            Hash,
            Debug,
            PartialEq,
            Eq,
            PartialOrd,
            Ord,
        )]
        pub struct $t([u8; 16]);

        impl $t {
            pub const ZERO: Self = Self([0u8; 16]);
            pub const MAX: Self = Self([0xffu8; 16]);

            pub fn random() -> Self {
                let mut bytes = [0u8; 16];
                ::rand::RngCore::fill_bytes(&mut ::rand::rng(), &mut bytes);
                Self(bytes)
            }

            pub fn as_slice(&self) -> &[u8] {
                self.0.as_slice()
            }
        }

        impl ::std::fmt::Display for $t {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                ::data_encoding::BASE32_NOPAD.encode_write(self.as_slice(), f)
            }
        }

        impl ::std::str::FromStr for $t {
            type Err = $crate::id::IdParseError;

            fn from_str(s: &str) -> Result<$t, Self::Err> {
                let v = ::data_encoding::BASE32_NOPAD
                    .decode(s.as_bytes())
                    .map_err(|_| $crate::id::IdParseError)?;
                let a = v.try_into().map_err(|_| $crate::id::IdParseError)?;
                Ok(Self(a))
            }
        }

        impl ::serde::Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: ::serde::Serializer,
            {
                serializer.collect_str(self)
            }
        }

        impl<'de> ::serde::Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::Deserializer<'de>,
            {
                let s = <::std::string::String as ::serde::Deserialize>::deserialize(
                    deserializer,
                )?;
                s.parse().map_err(::serde::de::Error::custom)
            }
        }
    };
}

/// Failure to decode a base32 id string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdParseError;

impl fmt::Display for IdParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("invalid id string")
    }
}

impl std::error::Error for IdParseError {}

define_id_type!(
    /// A managed community group.
    struct GroupId
);

define_id_type!(
    /// A normalized venue row.
    struct VenueId
);

define_id_type!(
    /// A canonical event row (not the upstream platform id).
    struct EventId
);

define_id_type!(
    /// An identity principal.
    struct UserId
);

define_id_type!(
    /// A rewardable badge definition.
    struct BadgeId
);

define_id_type!(
    /// A webhook subscription.
    struct WebhookId
);

define_id_type!(
    /// One webhook delivery attempt.
    struct DeliveryId
);

define_id_type!(
    /// One connection-sync attempt row.
    struct SyncLogId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_base32_round_trip() {
        let id = EventId::random();
        let s = id.to_string();
        assert_eq!(s.parse::<EventId>().expect("decodes"), id);
    }

    #[test]
    fn id_rejects_garbage() {
        assert!("not-base-32!".parse::<GroupId>().is_err());
        // Valid base32, wrong length.
        assert!("MZXW6".parse::<GroupId>().is_err());
    }

    #[test]
    fn id_serde_is_stringly() {
        let id = UserId::random();
        let json = serde_json::to_string(&id).expect("serializes");
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back, id);
    }
}
