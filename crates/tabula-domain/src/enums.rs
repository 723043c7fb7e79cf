//! Enumeration types stored as text columns.
//!
//! Every enum serializes as its `snake_case` name, which is also the value
//! written to the database.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Organisations
// ---------------------------------------------------------------------------

/// Billing plan of an organisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plan {
    /// No payment method, limited seats.
    #[default]
    Free,
    /// Paid per seat.
    Pro,
    /// Negotiated contract.
    Enterprise,
}

impl Plan {
    /// Column value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Enterprise => "enterprise",
        }
    }
}

/// What a member may do inside an organisation.
///
/// Ordered by privilege: `Member < Admin < Owner`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    /// Regular member.
    #[default]
    Member,
    /// Can manage members and settings.
    Admin,
    /// Full control, including billing and deletion.
    Owner,
}

impl MemberRole {
    /// Column value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

/// Lifecycle state of an invoice.
///
/// `Draft -> Open -> Paid | Void | Uncollectible`. `Paid` and `Void` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being prepared; not yet sent.
    #[default]
    Draft,
    /// Sent and awaiting payment.
    Open,
    /// Settled.
    Paid,
    /// Cancelled.
    Void,
    /// Written off after failed collection.
    Uncollectible,
}

impl InvoiceStatus {
    /// Column value.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::Paid => "paid",
            Self::Void => "void",
            Self::Uncollectible => "uncollectible",
        }
    }

    /// Whether no further transition is allowed.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::Void)
    }

    /// Whether moving from `self` to `next` is a valid transition.
    pub const fn can_become(self, next: Self) -> bool {
        match (self, next) {
            (Self::Draft, Self::Open | Self::Void)
            | (Self::Open, Self::Paid | Self::Void | Self::Uncollectible)
            | (Self::Uncollectible, Self::Paid | Self::Void) => true,
            (current, next) => current as u8 == next as u8,
        }
    }
}

macro_rules! impl_value {
    ($($name:ident),*) => {
        $(
            impl From<$name> for tabula_store::Value {
                fn from(value: $name) -> Self {
                    Self::Text(value.as_str().to_owned())
                }
            }
        )*
    };
}

impl_value!(Plan, MemberRole, InvoiceStatus);
