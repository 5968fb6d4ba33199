//! Identity types for LARDER entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Prefix carried by every locally synthesized identifier.
///
/// Server-assigned ids never start with this prefix, so a placeholder row can
/// always be told apart from a persisted one.
pub const TEMP_ID_PREFIX: &str = "temp-";

/// Common behaviour for all typed record identifiers.
pub trait RecordIdType:
    Clone + fmt::Debug + fmt::Display + Eq + std::hash::Hash + Send + Sync + 'static
{
    /// Wrap a raw identifier string.
    fn from_raw(raw: impl Into<String>) -> Self;

    /// Borrow the raw identifier string.
    fn as_str(&self) -> &str;

    /// Synthesize a temporary identifier for a placeholder row.
    fn temporary() -> Self {
        Self::from_raw(format!("{}{}", TEMP_ID_PREFIX, Uuid::new_v4().simple()))
    }

    /// Returns true if this id was synthesized locally and never confirmed.
    fn is_temporary(&self) -> bool {
        self.as_str().starts_with(TEMP_ID_PREFIX)
    }
}

macro_rules! define_record_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create an id from its raw string form.
            pub fn new(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            /// Consume the id and return the raw string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl RecordIdType for $name {
            fn from_raw(raw: impl Into<String>) -> Self {
                Self(raw.into())
            }

            fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(raw: &str) -> Self {
                Self(raw.to_string())
            }
        }

        impl From<String> for $name {
            fn from(raw: String) -> Self {
                Self(raw)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_record_id!(
    /// Identifier of a recipe row.
    RecipeId
);
define_record_id!(
    /// Identifier of a recipe ingredient row.
    IngredientId
);
define_record_id!(
    /// Identifier of a pantry.
    PantryId
);
define_record_id!(
    /// Identifier of a pantry item row.
    PantryItemId
);
define_record_id!(
    /// Identifier of a grocery (shopping) list.
    GroceryListId
);
define_record_id!(
    /// Identifier of a grocery item row.
    GroceryItemId
);
define_record_id!(
    /// Identifier of an authenticated user, as issued by the auth provider.
    UserId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temporary_ids_are_prefixed_and_unique() {
        let a = IngredientId::temporary();
        let b = IngredientId::temporary();
        assert!(a.is_temporary());
        assert!(a.as_str().starts_with(TEMP_ID_PREFIX));
        assert_ne!(a, b);
    }

    #[test]
    fn test_server_ids_are_not_temporary() {
        assert!(!IngredientId::from("abc").is_temporary());
        assert!(!RecipeId::new("0198c0de-0000-7000-8000-000000000000").is_temporary());
    }

    #[test]
    fn test_id_serializes_as_plain_string() {
        let id = RecipeId::from("r1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"r1\"");
        let back: RecipeId = serde_json::from_str("\"r1\"").unwrap();
        assert_eq!(back, id);
    }
}
