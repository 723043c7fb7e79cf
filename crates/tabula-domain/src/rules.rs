//! Built-in domain invariants, enforced as typed Before-hook vetoes.
//!
//! Every veto carries a [`RuleViolation`]; callers recover it with
//! `StoreError::hook_error()` and `HookError::downcast_ref`.
//!
//! Bulk updates and deletes reach these rules once per matched row, so a
//! filter-scoped write cannot sidestep them. The last-owner check reads
//! through the collection that raised the write, which sees any earlier
//! writes of the same transaction.

use std::collections::HashSet;

use anyhow::anyhow;
use tabula_store::{Filter, FindOptions, with_filter};
use tracing::debug;

use crate::enums::{InvoiceStatus, MemberRole};
use crate::hooks::{DomainHooks, EntityEvent};
use crate::ids::OrganisationId;
use crate::structs::{Organisation, OrganisationMember};

/// A domain invariant that a write would break.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleViolation {
    /// Organisation names must not be blank.
    #[error("organisation name must not be empty")]
    EmptyOrganisationName,

    /// Organisations need at least one seat.
    #[error("an organisation needs at least one seat, got {0}")]
    NoSeats(i64),

    /// Invoice totals are never negative.
    #[error("invoice amount must not be negative, got {0}")]
    NegativeAmount(i64),

    /// The invoice status change is not an allowed transition.
    #[error("invoice cannot move from {from} to {to}")]
    InvoiceTransition {
        /// Current status.
        from: &'static str,
        /// Requested status.
        to: &'static str,
    },

    /// Removing or demoting this member would leave no owner.
    #[error("organisation {0} must keep at least one owner")]
    LastOwner(OrganisationId),
}

/// Register every built-in rule on `domain`.
pub fn install(domain: &DomainHooks) {
    domain.organisations.before_create.add(|event| async move {
        check_organisation(&event.record)?;
        Ok(())
    });
    domain.organisations.before_update.add(|event| async move {
        check_organisation(&event.record)?;
        Ok(())
    });

    domain.invoices.before_create.add(|event| async move {
        check_amount(event.record.amount_cents)?;
        Ok(())
    });
    domain.invoices.before_update.add(|event| async move {
        check_amount(event.record.amount_cents)?;
        if let Some(old) = &event.old_record {
            check_transition(old.status, event.record.status)?;
        }
        Ok(())
    });

    domain.organisation_members.before_delete.add(|event| async move {
        if event.record.role == MemberRole::Owner {
            ensure_owner_remains(&event).await?;
        }
        Ok(())
    });
    domain.organisation_members.before_update.add(|event| async move {
        let demoted = event.old_record.as_ref().is_some_and(|old| {
            old.role == MemberRole::Owner && event.record.role != MemberRole::Owner
        });
        if demoted {
            ensure_owner_remains(&event).await?;
        }
        Ok(())
    });

    debug!("Domain rules installed");
}

fn check_organisation(org: &Organisation) -> Result<(), RuleViolation> {
    if org.name.trim().is_empty() {
        return Err(RuleViolation::EmptyOrganisationName);
    }
    if org.seats < 1 {
        return Err(RuleViolation::NoSeats(org.seats));
    }
    Ok(())
}

const fn check_amount(amount_cents: i64) -> Result<(), RuleViolation> {
    if amount_cents < 0 {
        return Err(RuleViolation::NegativeAmount(amount_cents));
    }
    Ok(())
}

const fn check_transition(from: InvoiceStatus, to: InvoiceStatus) -> Result<(), RuleViolation> {
    if from.can_become(to) {
        Ok(())
    } else {
        Err(RuleViolation::InvoiceTransition {
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Veto unless some owner of the member's organisation is untouched by
/// the write: the member itself, or every row a bulk write matched.
async fn ensure_owner_remains(event: &EntityEvent<OrganisationMember>) -> anyhow::Result<()> {
    let organisation_id = &event.record.organisation_id;
    let members = event
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("cannot check owners of {organisation_id} without a collection"))?;

    let leaving: HashSet<String> = match &event.scope {
        Some(scope) => members
            .find_with(&FindOptions {
                predicate: Some(scope.clone()),
                ..FindOptions::default()
            })
            .await?
            .records
            .iter()
            .map(|row| row.string("id"))
            .collect(),
        None => HashSet::from([event.record.id.to_string()]),
    };

    let owners = members
        .find([with_filter(
            Filter::new()
                .eq("organisation_id", organisation_id)
                .eq("role", MemberRole::Owner),
        )])
        .await?
        .records;
    if owners.iter().all(|owner| leaving.contains(&owner.string("id"))) {
        return Err(RuleViolation::LastOwner(organisation_id.clone()).into());
    }
    Ok(())
}
