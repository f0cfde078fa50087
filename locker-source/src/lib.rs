//! External collaborators of the sync engine: the HTTP catalog source and
//! the blob store for cached binary assets.

pub mod blob;
pub mod client;
pub mod credentials;
pub mod error;

pub use blob::{BlobError, BlobMeta, BlobStore, LocalBlobStore};
pub use client::{CatalogClient, CatalogSource, FetchResult};
pub use credentials::{config_path, CredentialSource, CredentialSources, Credentials};
pub use error::SourceError;
