//! Domain row types.
//!
//! Each struct mirrors one table in `schema/`. Fields with a database
//! default carry a serde default so candidate records (which only hold what
//! the caller supplied plus stamped fields) still decode in Before hooks.
//! Unassigned ids and timestamps are skipped on serialization so the store
//! stamps them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Entity;
use crate::enums::{InvoiceStatus, MemberRole, Plan};
use crate::ids::{AccountId, InvoiceId, MemberId, OrganisationId};

const fn default_true() -> bool {
    true
}

const fn default_seats() -> i64 {
    1
}

fn default_currency() -> String {
    "EUR".to_owned()
}

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Row id.
    #[serde(default, skip_serializing_if = "AccountId::is_empty")]
    pub id: AccountId,
    /// Login email, unique.
    pub email: String,
    /// Name shown to other members.
    #[serde(default)]
    pub display_name: String,
    /// Disabled accounts cannot sign in.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Account {
    /// A new, active account.
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: AccountId::default(),
            email: email.into(),
            display_name: display_name.into(),
            active: true,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Account {
    const TABLE: &'static str = "accounts";
}

// ---------------------------------------------------------------------------
// Organisations
// ---------------------------------------------------------------------------

/// A tenant that owns members and invoices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organisation {
    /// Row id.
    #[serde(default, skip_serializing_if = "OrganisationId::is_empty")]
    pub id: OrganisationId,
    /// Display name.
    pub name: String,
    /// URL-safe unique handle.
    pub slug: String,
    /// Billing plan.
    #[serde(default)]
    pub plan: Plan,
    /// Purchased seats. At least one.
    #[serde(default = "default_seats")]
    pub seats: i64,
    /// Free-form settings stored as JSON.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<serde_json::Value>,
    /// Insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Organisation {
    /// A new organisation on the free plan with one seat.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            id: OrganisationId::default(),
            name: name.into(),
            slug: slug.into(),
            plan: Plan::default(),
            seats: default_seats(),
            settings: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Organisation {
    const TABLE: &'static str = "organisations";
}

/// Membership of an account in an organisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganisationMember {
    /// Row id.
    #[serde(default, skip_serializing_if = "MemberId::is_empty")]
    pub id: MemberId,
    /// Organisation joined.
    pub organisation_id: OrganisationId,
    /// Account that joined.
    pub account_id: AccountId,
    /// Privilege level.
    #[serde(default)]
    pub role: MemberRole,
    /// Insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl OrganisationMember {
    /// A membership with `role`.
    pub const fn new(
        organisation_id: OrganisationId,
        account_id: AccountId,
        role: MemberRole,
    ) -> Self {
        Self {
            id: MemberId(String::new()),
            organisation_id,
            account_id,
            role,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for OrganisationMember {
    const TABLE: &'static str = "organisation_members";
}

// ---------------------------------------------------------------------------
// Billing
// ---------------------------------------------------------------------------

/// An invoice issued to an organisation.
///
/// Amounts are integer minor units (cents) so no floating-point rounding
/// ever touches money.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Row id.
    #[serde(default, skip_serializing_if = "InvoiceId::is_empty")]
    pub id: InvoiceId,
    /// Billed organisation.
    pub organisation_id: OrganisationId,
    /// Human-facing invoice number, unique.
    pub number: String,
    /// Total in minor units. Never negative.
    pub amount_cents: i64,
    /// ISO 4217 code.
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Lifecycle state.
    #[serde(default)]
    pub status: InvoiceStatus,
    /// Payment due date.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// When payment was received.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paid_at: Option<DateTime<Utc>>,
    /// Insert time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Last update time.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Invoice {
    /// A draft invoice in the default currency.
    pub fn draft(
        organisation_id: OrganisationId,
        number: impl Into<String>,
        amount_cents: i64,
    ) -> Self {
        Self {
            id: InvoiceId::default(),
            organisation_id,
            number: number.into(),
            amount_cents,
            currency: default_currency(),
            status: InvoiceStatus::Draft,
            due_at: None,
            paid_at: None,
            created_at: None,
            updated_at: None,
        }
    }
}

impl Entity for Invoice {
    const TABLE: &'static str = "invoices";
    const TIMESTAMPS: &'static [&'static str] = &["due_at", "paid_at", "created_at", "updated_at"];
}
