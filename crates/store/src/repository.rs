use async_trait::async_trait;

use crate::{Record, Result, StoreError, Version, Versioned};

/// Predicate used by [`Repository::find`].
pub type Filter<'a, R> = &'a (dyn Fn(&R) -> bool + Send + Sync);

/// CRUD contract every service store implements.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Repository<R: Record>: Send + Sync {
    /// Inserts a new record at [`Version::first`].
    ///
    /// Fails with `Duplicate` if the key is already taken.
    async fn insert(&self, record: R) -> Result<Versioned<R>>;

    /// Loads a record by key.
    async fn get(&self, key: &R::Key) -> Result<Option<Versioned<R>>>;

    /// Replaces a record, provided it is still at `expected`.
    ///
    /// Fails with `ConcurrencyConflict` if another write landed since the
    /// record was read. Returns the new version.
    async fn update(&self, record: R, expected: Version) -> Result<Version>;

    /// Removes a record. Returns false if it did not exist.
    async fn delete(&self, key: &R::Key) -> Result<bool>;

    /// Returns every record matching the filter, in no particular order.
    async fn find(&self, filter: Filter<'_, R>) -> Result<Vec<Versioned<R>>>;

    /// Hands out the next value of the store's numeric sequence (starting at 1).
    async fn next_sequence(&self) -> Result<u64>;
}

/// Convenience methods for repositories.
#[async_trait]
pub trait RepositoryExt<R: Record>: Repository<R> {
    /// Loads a record that must exist.
    async fn get_required(&self, key: &R::Key) -> Result<Versioned<R>> {
        self.get(key).await?.ok_or_else(|| StoreError::NotFound {
            record_type: R::record_type(),
            key: key.to_string(),
        })
    }

    /// Returns the first record matching the filter.
    async fn find_one(&self, filter: Filter<'_, R>) -> Result<Option<Versioned<R>>> {
        Ok(self.find(filter).await?.into_iter().next())
    }
}

impl<R: Record, T: Repository<R> + ?Sized> RepositoryExt<R> for T {}
