//! Type-safe identifier wrappers.
//!
//! Row ids are strings in the store (UUID v7 text by default, generated by
//! the store's id generator on insert). Each table gets its own newtype so
//! an organisation id cannot be passed where an account id is expected.
//!
//! An empty id means "not yet assigned"; it is skipped on serialization so
//! the store fills it in.

use serde::{Deserialize, Serialize};

/// Generates a newtype wrapper around a string row id.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Wrap an existing id.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Borrow the id text.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Whether no id has been assigned yet.
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }

            /// Return the inner string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_owned())
            }
        }

        impl From<$name> for tabula_store::Value {
            fn from(id: $name) -> Self {
                Self::Text(id.0)
            }
        }

        impl From<&$name> for tabula_store::Value {
            fn from(id: &$name) -> Self {
                Self::Text(id.0.clone())
            }
        }
    };
}

define_id! {
    /// Unique identifier for a user account.
    AccountId
}

define_id! {
    /// Unique identifier for an organisation (tenant).
    OrganisationId
}

define_id! {
    /// Unique identifier for an account's membership in an organisation.
    MemberId
}

define_id! {
    /// Unique identifier for an invoice.
    InvoiceId
}
