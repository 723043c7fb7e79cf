//! Database lifecycle events.
//!
//! Every mutating [`Collection`](crate::Collection) call raises a Before
//! event (which may veto) and, once the write has happened, an After event.
//! [`DatabaseHooks`] owns one [`Hook`] per event kind and a list of
//! [`TableRouter`]s that re-raise events for a single table as typed
//! events.
//!
//! Raising an event triggers the generic hook first, then every router
//! registered for the event's table, in registration order. The first veto
//! from either stops the chain.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tabula_hooks::{Dispatcher, Hook};

use crate::collection::Collection;
use crate::error::StoreError;
use crate::filter::Predicate;
use crate::record::Record;

/// Which lifecycle point an event describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Before a row is inserted.
    BeforeCreate,
    /// After a row was inserted.
    AfterCreate,
    /// Before rows are updated.
    BeforeUpdate,
    /// After rows were updated.
    AfterUpdate,
    /// Before rows are deleted.
    BeforeDelete,
    /// After rows were deleted.
    AfterDelete,
}

impl EventKind {
    /// Every kind, in lifecycle order.
    pub const ALL: [Self; 6] = [
        Self::BeforeCreate,
        Self::AfterCreate,
        Self::BeforeUpdate,
        Self::AfterUpdate,
        Self::BeforeDelete,
        Self::AfterDelete,
    ];

    /// Snake-case name, also used as the hook name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCreate => "before_create",
            Self::AfterCreate => "after_create",
            Self::BeforeUpdate => "before_update",
            Self::AfterUpdate => "after_update",
            Self::BeforeDelete => "before_delete",
            Self::AfterDelete => "after_delete",
        }
    }

    /// Whether handlers of this kind can veto the write.
    pub const fn is_before(self) -> bool {
        matches!(
            self,
            Self::BeforeCreate | Self::BeforeUpdate | Self::BeforeDelete
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lifecycle notification for one table.
///
/// Single-row events carry the row in `record` (the candidate for Before
/// events, the persisted row for After events). Updates also carry the row
/// as it was in `old_record`. Bulk events carry the predicate that scopes
/// them in `filter`; their `record` holds only the fields being set (or
/// nothing, for deletes).
///
/// Events raised by a [`Collection`] carry it in `source`. Handlers that
/// need to read before allowing a write query through it, so they see the
/// same connection and the same open transaction as the write itself.
#[derive(Debug, Clone)]
pub struct DatabaseEvent {
    /// Lifecycle point.
    pub kind: EventKind,
    /// Table being written.
    pub table: String,
    /// Candidate or persisted row.
    pub record: Record,
    /// The row before an update or delete.
    pub old_record: Option<Record>,
    /// Scope of a bulk operation.
    pub filter: Option<Predicate>,
    /// The collection that raised the event.
    pub source: Option<Collection>,
}

impl DatabaseEvent {
    /// A single-row event.
    pub fn new(kind: EventKind, table: impl Into<String>, record: Record) -> Self {
        Self {
            kind,
            table: table.into(),
            record,
            old_record: None,
            filter: None,
            source: None,
        }
    }

    /// Attach the previous row.
    #[must_use]
    pub fn with_old_record(mut self, old: Record) -> Self {
        self.old_record = Some(old);
        self
    }

    /// Mark as a bulk event scoped by `filter`.
    #[must_use]
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Attach the collection raising the event.
    #[must_use]
    pub fn with_source(mut self, source: Collection) -> Self {
        self.source = Some(source);
        self
    }

    /// Same event at a different lifecycle point.
    #[must_use]
    pub fn into_kind(mut self, kind: EventKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether this event covers a filter rather than a single row.
    pub const fn is_bulk(&self) -> bool {
        self.filter.is_some()
    }
}

/// Re-raises events for one table, typically as typed events.
#[async_trait]
pub trait TableRouter: Send + Sync {
    /// The table this router handles.
    fn table(&self) -> &str;

    /// Handle an event for [`table`](Self::table). An error vetoes Before
    /// events.
    async fn route(&self, event: &DatabaseEvent) -> Result<(), StoreError>;
}

/// The six generic lifecycle hooks plus per-table routers.
pub struct DatabaseHooks {
    /// Raised before an insert.
    pub before_create: Hook<DatabaseEvent>,
    /// Raised after an insert.
    pub after_create: Hook<DatabaseEvent>,
    /// Raised before an update.
    pub before_update: Hook<DatabaseEvent>,
    /// Raised after an update.
    pub after_update: Hook<DatabaseEvent>,
    /// Raised before a delete.
    pub before_delete: Hook<DatabaseEvent>,
    /// Raised after a delete.
    pub after_delete: Hook<DatabaseEvent>,
    routers: RwLock<Vec<Arc<dyn TableRouter>>>,
    dispatcher: Dispatcher,
}

impl DatabaseHooks {
    /// Create empty hooks sharing one dispatcher for async subscribers.
    pub fn new(dispatcher: Dispatcher) -> Self {
        let hook = |kind: EventKind| Hook::with_dispatcher(kind.as_str(), dispatcher.clone());
        Self {
            before_create: hook(EventKind::BeforeCreate),
            after_create: hook(EventKind::AfterCreate),
            before_update: hook(EventKind::BeforeUpdate),
            after_update: hook(EventKind::AfterUpdate),
            before_delete: hook(EventKind::BeforeDelete),
            after_delete: hook(EventKind::AfterDelete),
            routers: RwLock::new(Vec::new()),
            dispatcher,
        }
    }

    /// The hook for `kind`.
    pub const fn hook(&self, kind: EventKind) -> &Hook<DatabaseEvent> {
        match kind {
            EventKind::BeforeCreate => &self.before_create,
            EventKind::AfterCreate => &self.after_create,
            EventKind::BeforeUpdate => &self.before_update,
            EventKind::AfterUpdate => &self.after_update,
            EventKind::BeforeDelete => &self.before_delete,
            EventKind::AfterDelete => &self.after_delete,
        }
    }

    /// The dispatcher shared by every hook.
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Register a router. Routers for the same table run in registration
    /// order.
    pub fn add_router(&self, router: Arc<dyn TableRouter>) {
        tracing::debug!(table = router.table(), "Registered table router");
        self.routers.write().push(router);
    }

    /// Number of routers registered for `table`.
    pub fn router_count(&self, table: &str) -> usize {
        self.routers
            .read()
            .iter()
            .filter(|router| router.table() == table)
            .count()
    }

    /// Trigger the generic hook for the event's kind, then the routers for
    /// its table.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Rejected`] for a generic hook veto, or
    /// whatever error a router returns.
    pub async fn raise(&self, event: DatabaseEvent) -> Result<(), StoreError> {
        let routers: Vec<Arc<dyn TableRouter>> = self
            .routers
            .read()
            .iter()
            .filter(|router| router.table() == event.table)
            .cloned()
            .collect();

        let hook = self.hook(event.kind);
        if routers.is_empty() {
            hook.trigger(event).await?;
            return Ok(());
        }

        hook.trigger(event.clone()).await?;
        for router in routers {
            router.route(&event).await?;
        }
        Ok(())
    }
}

impl Default for DatabaseHooks {
    fn default() -> Self {
        Self::new(Dispatcher::default())
    }
}

impl fmt::Debug for DatabaseHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHooks")
            .field("before_create", &self.before_create)
            .field("after_create", &self.after_create)
            .field("before_update", &self.before_update)
            .field("after_update", &self.after_update)
            .field("before_delete", &self.before_delete)
            .field("after_delete", &self.after_delete)
            .field("routers", &self.routers.read().len())
            .finish_non_exhaustive()
    }
}
