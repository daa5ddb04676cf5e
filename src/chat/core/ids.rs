// File: src/chat/core/ids.rs

//! Identifier types for conversations, turns, and displayed messages.
//!
//! UUID newtypes keep turn, conversation, and message identifiers apart at
//! compile time. [`UserIdentity`] wraps the stable identity (an email
//! address) supplied by the auth gate.
//!
//! ## Cargo features used by this module
//! - `uuid_v7`: enables `UUIDv7` generation via `uuid/v7` for time-ordered ids.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generate an ID intended to have good DB insert locality.
///
/// With feature `uuid_v7` enabled, this uses `Uuid::now_v7()`.
/// Otherwise it falls back to `Uuid::new_v4()`.
#[inline]
#[must_use]
fn uuid_time_ordered() -> Uuid {
    #[cfg(feature = "uuid_v7")]
    {
        Uuid::now_v7()
    }
    #[cfg(not(feature = "uuid_v7"))]
    {
        Uuid::new_v4()
    }
}

/// Generate a random UUID (v4).
#[inline]
#[must_use]
fn uuid_random() -> Uuid {
    Uuid::new_v4()
}

/// Declare a UUID newtype with a consistent API.
macro_rules! define_uuid_id {
    (
        $(#[$meta:meta])*
        $name:ident,
        generator = $make:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[repr(transparent)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl Default for $name {
            #[inline]
            fn default() -> Self {
                Self::new()
            }
        }

        impl $name {
            /// Create a new identifier.
            #[inline]
            #[must_use]
            pub fn new() -> Self {
                Self($make())
            }

            /// Wrap an existing UUID.
            #[inline]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Extract the underlying UUID.
            #[inline]
            #[must_use]
            pub const fn into_uuid(self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            #[inline]
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            #[inline]
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

define_uuid_id!(
    /// Identifier of one persisted prompt/reply pair.
    TurnId,
    generator = uuid_time_ordered
);

define_uuid_id!(
    /// Identifier shared by every turn of one conversation thread.
    ///
    /// Minted on the first send of a fresh thread; turns persisted without one
    /// fall back to their own [`TurnId`] as the thread key.
    ConversationId,
    generator = uuid_time_ordered
);

define_uuid_id!(
    /// Synthetic local identifier of a displayed message.
    ///
    /// Never persisted: two are derived from every turn on load.
    MessageId,
    generator = uuid_random
);

impl From<TurnId> for ConversationId {
    fn from(value: TurnId) -> Self {
        Self(value.0)
    }
}

// ===== User identity ========================================================

/// Errors returned when validating a [`UserIdentity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserIdentityError {
    /// Empty (or whitespace-only) identity.
    Empty,
    /// Exceeds the maximum accepted length.
    TooLong {
        /// Maximum allowed length.
        max: usize,
        /// Actual length received.
        got: usize,
    },
    /// Contains whitespace inside the identity.
    Whitespace,
}

impl fmt::Display for UserIdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "user identity must not be empty"),
            Self::TooLong { max, got } => {
                write!(f, "user identity too long: got {got}, max {max}")
            }
            Self::Whitespace => write!(f, "user identity must not contain whitespace"),
        }
    }
}

impl std::error::Error for UserIdentityError {}

/// Stable identity of an authenticated user (their email address).
///
/// Turns are owned by an identity; every store query is scoped by it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
#[serde(try_from = "String", into = "String")]
pub struct UserIdentity(String);

impl UserIdentity {
    /// Hard ceiling matching the longest valid email address.
    pub const MAX_LEN: usize = 320;

    /// Build a validated identity. Surrounding whitespace is trimmed.
    ///
    /// # Errors
    /// Returns `UserIdentityError` if the input is empty, too long, or contains whitespace.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, UserIdentityError> {
        let s = raw.as_ref().trim();

        if s.is_empty() {
            return Err(UserIdentityError::Empty);
        }
        if s.len() > Self::MAX_LEN {
            return Err(UserIdentityError::TooLong {
                max: Self::MAX_LEN,
                got: s.len(),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(UserIdentityError::Whitespace);
        }

        Ok(Self(s.to_owned()))
    }

    /// Borrow as `&str`.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserIdentity {
    type Err = UserIdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for UserIdentity {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<UserIdentity> for String {
    fn from(value: UserIdentity) -> Self {
        value.0
    }
}

impl TryFrom<String> for UserIdentity {
    type Error = UserIdentityError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

// ===== Rusqlite integration ================================================

mod rusqlite_impl {
    use super::{ConversationId, TurnId, UserIdentity, UserIdentityError};
    use std::fmt;

    use rusqlite::types::{
        FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value, ValueRef,
    };

    #[derive(Debug)]
    struct InvalidUuidBlobLen {
        got: usize,
    }

    impl fmt::Display for InvalidUuidBlobLen {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "invalid UUID blob length: got {}, expected 16", self.got)
        }
    }

    impl std::error::Error for InvalidUuidBlobLen {}

    fn uuid_from_blob(b: &[u8]) -> FromSqlResult<uuid::Uuid> {
        let bytes: [u8; 16] = b
            .try_into()
            .map_err(|_| FromSqlError::Other(Box::new(InvalidUuidBlobLen { got: b.len() })))?;
        Ok(uuid::Uuid::from_bytes(bytes))
    }

    fn uuid_from_text(t: &[u8]) -> FromSqlResult<uuid::Uuid> {
        let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
        uuid::Uuid::parse_str(s).map_err(|e| FromSqlError::Other(Box::new(e)))
    }

    macro_rules! impl_rusqlite_uuid_newtype {
        ($t:ty) => {
            impl ToSql for $t {
                fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                    Ok(ToSqlOutput::Owned(Value::Text(self.0.to_string())))
                }
            }

            impl FromSql for $t {
                fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                    match value {
                        ValueRef::Blob(b) => uuid_from_blob(b).map(Self),
                        ValueRef::Text(t) => uuid_from_text(t).map(Self),
                        _ => Err(FromSqlError::InvalidType),
                    }
                }
            }
        };
    }

    impl_rusqlite_uuid_newtype!(TurnId);
    impl_rusqlite_uuid_newtype!(ConversationId);

    impl ToSql for UserIdentity {
        fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
            Ok(ToSqlOutput::Borrowed(ValueRef::Text(self.as_str().as_bytes())))
        }
    }

    impl FromSql for UserIdentity {
        fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
            match value {
                ValueRef::Text(t) => {
                    let s = std::str::from_utf8(t).map_err(|e| FromSqlError::Other(Box::new(e)))?;
                    Self::new(s).map_err(|e| FromSqlError::Other(Box::new(e)))
                }
                ValueRef::Null => Err(FromSqlError::Other(Box::new(UserIdentityError::Empty))),
                _ => Err(FromSqlError::InvalidType),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_identity_trims_and_validates() {
        let identity = UserIdentity::new("  founder@example.com ").unwrap();
        assert_eq!(identity.as_str(), "founder@example.com");

        assert_eq!(UserIdentity::new("   "), Err(UserIdentityError::Empty));
        assert_eq!(
            UserIdentity::new("two words@example.com"),
            Err(UserIdentityError::Whitespace)
        );
        let long = "a".repeat(UserIdentity::MAX_LEN + 1);
        assert!(matches!(
            UserIdentity::new(long),
            Err(UserIdentityError::TooLong { .. })
        ));
    }

    #[test]
    fn test_user_identity_serde_rejects_empty() {
        let parsed: Result<UserIdentity, _> = serde_json::from_str("\"\"");
        assert!(parsed.is_err());

        let parsed: UserIdentity = serde_json::from_str("\"a@b.io\"").unwrap();
        assert_eq!(parsed.to_string(), "a@b.io");
    }

    #[test]
    fn test_conversation_id_from_turn_id_keeps_uuid() {
        let turn = TurnId::new();
        let conversation = ConversationId::from(turn);
        assert_eq!(conversation.into_uuid(), turn.into_uuid());
    }
}
