//! Typed access to a single table.
//!
//! [`Table`] wraps a [`Collection`] and converts between rows and an
//! [`Entity`] type through the record's JSON round-trip. It goes through
//! the same event pipeline as untyped writes.
//!
//! Serialising an entity turns its timestamps into RFC 3339 text. Before a
//! write, the fields named in [`Entity::TIMESTAMPS`] are turned back into
//! timestamp values so they bind with the column's type.

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tabula_store::{
    Collection, FindOption, Predicate, Record, Store, StoreError, Transaction, Value,
};

/// A row type bound to one table.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Table the rows live in.
    const TABLE: &'static str;

    /// Fields stored in timestamp columns.
    const TIMESTAMPS: &'static [&'static str] = &["created_at", "updated_at"];
}

/// Encode `entity` as a record ready to bind.
///
/// # Errors
///
/// Returns [`StoreError::Serialization`] if the entity cannot be encoded.
pub fn to_record<T: Entity>(entity: &T) -> Result<Record, StoreError> {
    Ok(with_typed_timestamps::<T>(Record::from_serializable(entity)?))
}

fn with_typed_timestamps<T: Entity>(mut record: Record) -> Record {
    for field in T::TIMESTAMPS {
        let parsed = record
            .get(field)
            .and_then(Value::as_str)
            .and_then(|text| DateTime::parse_from_rfc3339(text).ok());
        if let Some(at) = parsed {
            record.insert(*field, at.with_timezone(&Utc));
        }
    }
    record
}

/// Typed wrapper around the collection for `T::TABLE`.
pub struct Table<T> {
    collection: Collection,
    entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Table<T> {
    /// The table in `store`, outside any transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `T::TABLE` is not a valid
    /// identifier.
    pub fn new(store: &Store) -> Result<Self, StoreError> {
        Ok(Self::from_collection(store.collection(T::TABLE)?))
    }

    /// The table bound to `tx`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] if `T::TABLE` is not a valid
    /// identifier.
    pub fn within(tx: &Transaction) -> Result<Self, StoreError> {
        Ok(Self::from_collection(tx.collection(T::TABLE)?))
    }

    const fn from_collection(collection: Collection) -> Self {
        Self {
            collection,
            entity: PhantomData,
        }
    }

    /// The untyped collection underneath.
    pub const fn collection(&self) -> &Collection {
        &self.collection
    }

    /// Fetch the row with `id`.
    pub async fn get(&self, id: &str) -> Result<T, StoreError> {
        self.collection.get_as(id).await
    }

    /// First row matching `filter`.
    pub async fn find_one(&self, filter: impl Into<Predicate>) -> Result<T, StoreError> {
        self.collection.find_one(filter).await?.decode()
    }

    /// Rows matching `options`, without page metadata.
    pub async fn find(
        &self,
        options: impl IntoIterator<Item = FindOption>,
    ) -> Result<Vec<T>, StoreError> {
        self.collection
            .find(options)
            .await?
            .records
            .iter()
            .map(Record::decode::<T>)
            .collect()
    }

    /// Insert `entity` and return it as stored, with id and timestamps
    /// filled in.
    pub async fn create(&self, entity: &T) -> Result<T, StoreError> {
        self.collection.create_record(to_record(entity)?).await?.decode()
    }

    /// Apply `changes` to the row with `id` and return it as stored.
    pub async fn update(&self, id: &str, changes: Record) -> Result<T, StoreError> {
        self.collection
            .update_record(id, with_typed_timestamps::<T>(changes))
            .await?
            .decode()
    }

    /// Delete the row with `id`.
    pub async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.collection.delete_record(id).await
    }
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            collection: self.collection.clone(),
            entity: PhantomData,
        }
    }
}

impl<T: Entity> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table").field("table", &T::TABLE).finish()
    }
}
