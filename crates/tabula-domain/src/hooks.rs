//! Typed per-table hooks.
//!
//! [`EntityHooks<T>`] is a [`TableRouter`]: once attached to the store's
//! [`DatabaseHooks`], every single-row event for `T::TABLE` is decoded into
//! `T` and re-raised on the matching typed hook, after the generic hook has
//! run. A veto from a typed Before handler aborts the write exactly like a
//! generic one.
//!
//! Bulk Before events are resolved into the rows their filter matches,
//! read through the raising collection, and re-raised once per row with
//! the changes applied, so typed vetoes hold for bulk writes too. Bulk
//! After events are not re-raised: the rows have already changed or gone.

use std::sync::Arc;

use async_trait::async_trait;
use tabula_hooks::{Dispatcher, Hook};
use tracing::debug;
use tabula_store::{
    Collection, DatabaseEvent, DatabaseHooks, EventKind, FindOptions, Predicate, Record,
    StoreError, TableRouter,
};

use crate::entity::Entity;
use crate::structs::{Account, Invoice, Organisation, OrganisationMember};

/// A lifecycle event for one decoded row.
#[derive(Debug, Clone)]
pub struct EntityEvent<T> {
    /// Lifecycle point.
    pub kind: EventKind,
    /// Candidate row for Before events, stored row for After events. For
    /// deletes, the row being removed.
    pub record: T,
    /// The row before an update.
    pub old_record: Option<T>,
    /// The collection that raised the write; reads through it share the
    /// write's connection and transaction.
    pub source: Option<Collection>,
    /// Filter of the bulk write this row was matched by, if any.
    pub scope: Option<Predicate>,
}

/// Six typed lifecycle hooks for one entity type.
pub struct EntityHooks<T> {
    /// Raised before an insert.
    pub before_create: Hook<EntityEvent<T>>,
    /// Raised after an insert.
    pub after_create: Hook<EntityEvent<T>>,
    /// Raised before an update.
    pub before_update: Hook<EntityEvent<T>>,
    /// Raised after an update.
    pub after_update: Hook<EntityEvent<T>>,
    /// Raised before a delete.
    pub before_delete: Hook<EntityEvent<T>>,
    /// Raised after a delete.
    pub after_delete: Hook<EntityEvent<T>>,
}

impl<T: Entity> EntityHooks<T> {
    /// Empty hooks named `<table>.<event>`, sharing `dispatcher`.
    pub fn new(dispatcher: &Dispatcher) -> Self {
        let hook = |kind: EventKind| {
            Hook::with_dispatcher(format!("{}.{kind}", T::TABLE), dispatcher.clone())
        };
        Self {
            before_create: hook(EventKind::BeforeCreate),
            after_create: hook(EventKind::AfterCreate),
            before_update: hook(EventKind::BeforeUpdate),
            after_update: hook(EventKind::AfterUpdate),
            before_delete: hook(EventKind::BeforeDelete),
            after_delete: hook(EventKind::AfterDelete),
        }
    }

    /// The hook for `kind`.
    pub const fn hook(&self, kind: EventKind) -> &Hook<EntityEvent<T>> {
        match kind {
            EventKind::BeforeCreate => &self.before_create,
            EventKind::AfterCreate => &self.after_create,
            EventKind::BeforeUpdate => &self.before_update,
            EventKind::AfterUpdate => &self.after_update,
            EventKind::BeforeDelete => &self.before_delete,
            EventKind::AfterDelete => &self.after_delete,
        }
    }

    /// Re-raise a bulk Before event once per matched row.
    async fn route_bulk(
        &self,
        event: &DatabaseEvent,
        scope: &Predicate,
    ) -> Result<(), StoreError> {
        let source = event.source.as_ref().ok_or_else(|| {
            StoreError::Validation(format!(
                "bulk {} on {} has no collection to resolve its rows",
                event.kind,
                T::TABLE
            ))
        })?;
        let matched = source
            .find_with(&FindOptions {
                predicate: Some(scope.clone()),
                ..FindOptions::default()
            })
            .await?
            .records;
        debug!(
            table = T::TABLE,
            kind = %event.kind,
            rows = matched.len(),
            "Routing bulk event per row"
        );

        let hook = self.hook(event.kind);
        for row in matched {
            let old_record = (event.kind == EventKind::BeforeUpdate)
                .then(|| row.decode::<T>())
                .transpose()?;
            let mut candidate = row;
            candidate.merge(&event.record);
            hook.trigger(EntityEvent {
                kind: event.kind,
                record: candidate.decode::<T>()?,
                old_record,
                source: Some(source.clone()),
                scope: Some(scope.clone()),
            })
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl<T: Entity> TableRouter for EntityHooks<T> {
    fn table(&self) -> &str {
        T::TABLE
    }

    async fn route(&self, event: &DatabaseEvent) -> Result<(), StoreError> {
        let hook = self.hook(event.kind);
        if hook.is_empty() {
            return Ok(());
        }
        match &event.filter {
            None => {
                let old_record = event
                    .old_record
                    .as_ref()
                    .map(Record::decode::<T>)
                    .transpose()?;
                hook.trigger(EntityEvent {
                    kind: event.kind,
                    record: event.record.decode::<T>()?,
                    old_record,
                    source: event.source.clone(),
                    scope: None,
                })
                .await?;
                Ok(())
            }
            Some(scope) if event.kind.is_before() => self.route_bulk(event, scope).await,
            Some(_) => Ok(()),
        }
    }
}

impl<T> std::fmt::Debug for EntityHooks<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityHooks")
            .field("before_create", &self.before_create)
            .field("after_create", &self.after_create)
            .field("before_update", &self.before_update)
            .field("after_update", &self.after_update)
            .field("before_delete", &self.before_delete)
            .field("after_delete", &self.after_delete)
            .finish()
    }
}

/// Typed hooks for every domain table.
#[derive(Debug, Clone)]
pub struct DomainHooks {
    /// `accounts` events.
    pub accounts: Arc<EntityHooks<Account>>,
    /// `organisations` events.
    pub organisations: Arc<EntityHooks<Organisation>>,
    /// `organisation_members` events.
    pub organisation_members: Arc<EntityHooks<OrganisationMember>>,
    /// `invoices` events.
    pub invoices: Arc<EntityHooks<Invoice>>,
}

impl DomainHooks {
    /// Empty hooks whose async handlers run on `dispatcher`.
    pub fn new(dispatcher: &Dispatcher) -> Self {
        Self {
            accounts: Arc::new(EntityHooks::new(dispatcher)),
            organisations: Arc::new(EntityHooks::new(dispatcher)),
            organisation_members: Arc::new(EntityHooks::new(dispatcher)),
            invoices: Arc::new(EntityHooks::new(dispatcher)),
        }
    }

    /// Create hooks on the store's dispatcher and register them as routers.
    pub fn attached_to(hooks: &DatabaseHooks) -> Self {
        let domain = Self::new(hooks.dispatcher());
        domain.attach(hooks);
        domain
    }

    /// Register every table's hooks as a router on `hooks`.
    pub fn attach(&self, hooks: &DatabaseHooks) {
        hooks.add_router(self.accounts.clone());
        hooks.add_router(self.organisations.clone());
        hooks.add_router(self.organisation_members.clone());
        hooks.add_router(self.invoices.clone());
        debug!(tables = 4, "Domain hooks attached");
    }
}
