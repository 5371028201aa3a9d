//! Branded ID newtypes.
//!
//! A [`SessionId`] is minted once per opened event stream and is the only
//! addressing key shared by the two transport roles. IDs are UUID v7
//! (time-ordered, 74 random bits) generated via [`uuid::Uuid::now_v7`], so
//! concurrently minted IDs never collide and an ID is never handed out twice.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Longest identifier accepted from the outside world.
pub const MAX_ID_LEN: usize = 128;

/// Rejection reasons for identifiers supplied by a client.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The identifier was empty.
    #[error("identifier is empty")]
    Empty,
    /// The identifier exceeded [`MAX_ID_LEN`].
    #[error("identifier exceeds {MAX_ID_LEN} characters")]
    TooLong,
    /// The identifier contained a character outside `[A-Za-z0-9_-]`.
    #[error("identifier contains invalid character {0:?}")]
    InvalidChar(char),
}

fn new_v7() -> String {
    Uuid::now_v7().to_string()
}

fn check(s: &str) -> Result<(), IdError> {
    if s.is_empty() {
        return Err(IdError::Empty);
    }
    if s.len() > MAX_ID_LEN {
        return Err(IdError::TooLong);
    }
    if let Some(c) = s
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        return Err(IdError::InvalidChar(c));
    }
    Ok(())
}

macro_rules! branded_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Mint a new ID (UUID v7).
            #[must_use]
            pub fn new() -> Self {
                Self(new_v7())
            }

            /// Accept an ID received from a client.
            ///
            /// The value stays opaque; only emptiness, length and character
            /// set are checked so it can be embedded in a broker channel name.
            pub fn parse(s: &str) -> Result<Self, IdError> {
                check(s)?;
                Ok(Self(s.to_owned()))
            }

            /// Return the inner string as a slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume self and return the inner `String`.
            #[must_use]
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::ops::Deref for $name {
            type Target = str;
            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = IdError;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

branded_id! {
    /// Routing key correlating one event stream with the inbound requests
    /// addressed to it.
    SessionId
}

branded_id! {
    /// Identifier of a single inbound request handled by a forwarder.
    ForwarderId
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use proptest::prelude::*;
    use std::collections::HashSet;

    #[test]
    fn session_id_new_is_uuid_v7() {
        let id = SessionId::new();
        let parsed = Uuid::parse_str(id.as_str()).expect("should be valid UUID");
        assert_eq!(parsed.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionId::new();
        let b = SessionId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn minted_ids_survive_parse() {
        let id = SessionId::new();
        let back = SessionId::parse(id.as_str()).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_rejects_empty() {
        assert_matches!(SessionId::parse(""), Err(IdError::Empty));
    }

    #[test]
    fn parse_rejects_too_long() {
        let s = "a".repeat(MAX_ID_LEN + 1);
        assert_matches!(SessionId::parse(&s), Err(IdError::TooLong));
    }

    #[test]
    fn parse_accepts_max_len() {
        let s = "a".repeat(MAX_ID_LEN);
        assert!(SessionId::parse(&s).is_ok());
    }

    #[test]
    fn parse_rejects_channel_separator() {
        assert_matches!(SessionId::parse("abc:def"), Err(IdError::InvalidChar(':')));
    }

    #[test]
    fn parse_rejects_whitespace() {
        assert_matches!(SessionId::parse("abc def"), Err(IdError::InvalidChar(' ')));
    }

    #[test]
    fn from_str_delegates_to_parse() {
        let id: SessionId = "sess_1".parse().unwrap();
        assert_eq!(id.as_str(), "sess_1");
        assert!("".parse::<SessionId>().is_err());
    }

    #[test]
    fn display_and_deref() {
        let id = SessionId::parse("display-me").unwrap();
        assert_eq!(format!("{id}"), "display-me");
        let s: &str = &id;
        assert_eq!(s, "display-me");
    }

    #[test]
    fn serde_is_transparent() {
        let id = SessionId::parse("serde-test").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"serde-test\"");
        let back: SessionId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn forwarder_ids_are_distinct_type() {
        let f = ForwarderId::new();
        assert!(Uuid::parse_str(f.as_str()).is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn unique_under_concurrent_creation() {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                tokio::spawn(async {
                    (0..500).map(|_| SessionId::new()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            for id in h.await.unwrap() {
                assert!(seen.insert(id), "duplicate session id minted");
            }
        }
        assert_eq!(seen.len(), 16 * 500);
    }

    proptest! {
        #[test]
        fn parse_accepts_safe_alphabet(s in "[A-Za-z0-9_-]{1,128}") {
            let id = SessionId::parse(&s).unwrap();
            prop_assert_eq!(id.as_str(), s.as_str());
        }
    }
}
