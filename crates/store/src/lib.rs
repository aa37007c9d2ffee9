//! Storage collaborator for the services.
//!
//! Each service owns a private store exposed through the [`Repository`]
//! contract. Every write carries the version that was read, so two requests
//! racing on the same record cannot silently overwrite each other.

pub mod error;
pub mod memory;
pub mod record;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryRepository;
pub use record::{Record, Version, Versioned};
pub use repository::{Filter, Repository, RepositoryExt};
