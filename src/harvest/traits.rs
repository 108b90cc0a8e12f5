//! External seams and error types for the harvest pipeline.
//!
//! The pipeline talks to two collaborators it does not own: the catalog's
//! CRUD API and the job/object persistence layer. Both are async traits so
//! tests can substitute in-memory implementations.

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Group, GroupDict, HarvestJob, HarvestObject, Package, PackageDict};
use crate::oai::ProtocolError;

use super::mapper::MapError;

// ============================================================================
// External Interfaces
// ============================================================================

/// The downstream catalog's API, as far as the import stage needs it.
///
/// `package_create_or_update` must be an idempotent upsert keyed by the
/// package id. `group_show`/`group_create` back the find-or-create group
/// resolution, which must tolerate concurrent creation of the same group
/// (at-least-once, not exactly-once).
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn package_show(&self, id: &str) -> Result<Package, CatalogError>;

    async fn package_create_or_update(
        &self,
        package: &PackageDict,
    ) -> Result<Package, CatalogError>;

    async fn group_show(&self, id: &str) -> Result<Group, CatalogError>;

    async fn group_create(&self, group: &GroupDict) -> Result<Group, CatalogError>;
}

/// Append-only persistence for harvest objects and their error records.
///
/// Objects are never deleted; failed stages add error records instead. The
/// store assigns object ids on creation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Creates one pending work item for `guid` under `job`.
    async fn create_object(
        &self,
        guid: &str,
        job: &HarvestJob,
    ) -> Result<HarvestObject, StoreError>;

    /// Persists the serialized content blob produced by the fetch stage.
    async fn save_content(&self, object_id: &str, content: &str) -> Result<(), StoreError>;

    /// Records the catalog package reference and marks the object current.
    async fn save_package(&self, object_id: &str, package_id: &str) -> Result<(), StoreError>;

    /// Records an object-level error and marks the object failed for the
    /// given stage.
    async fn save_object_error(
        &self,
        object_id: &str,
        stage: HarvestStage,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Records a job-level error (gather-stage connection/listing failures).
    async fn save_gather_error(&self, job_id: &str, message: &str) -> Result<(), StoreError>;

    /// Transaction boundary invoked at the end of a successful import.
    async fn commit(&self) -> Result<(), StoreError>;
}

// Shared collaborators are the common case (the executor fans stages out
// over tasks), so both seams pass through `Arc`.

#[async_trait]
impl<T> CatalogApi for std::sync::Arc<T>
where
    T: CatalogApi + ?Sized,
{
    async fn package_show(&self, id: &str) -> Result<Package, CatalogError> {
        (**self).package_show(id).await
    }

    async fn package_create_or_update(
        &self,
        package: &PackageDict,
    ) -> Result<Package, CatalogError> {
        (**self).package_create_or_update(package).await
    }

    async fn group_show(&self, id: &str) -> Result<Group, CatalogError> {
        (**self).group_show(id).await
    }

    async fn group_create(&self, group: &GroupDict) -> Result<Group, CatalogError> {
        (**self).group_create(group).await
    }
}

#[async_trait]
impl<T> ObjectStore for std::sync::Arc<T>
where
    T: ObjectStore + ?Sized,
{
    async fn create_object(
        &self,
        guid: &str,
        job: &HarvestJob,
    ) -> Result<HarvestObject, StoreError> {
        (**self).create_object(guid, job).await
    }

    async fn save_content(&self, object_id: &str, content: &str) -> Result<(), StoreError> {
        (**self).save_content(object_id, content).await
    }

    async fn save_package(&self, object_id: &str, package_id: &str) -> Result<(), StoreError> {
        (**self).save_package(object_id, package_id).await
    }

    async fn save_object_error(
        &self,
        object_id: &str,
        stage: HarvestStage,
        message: &str,
    ) -> Result<(), StoreError> {
        (**self).save_object_error(object_id, stage, message).await
    }

    async fn save_gather_error(&self, job_id: &str, message: &str) -> Result<(), StoreError> {
        (**self).save_gather_error(job_id, message).await
    }

    async fn commit(&self) -> Result<(), StoreError> {
        (**self).commit().await
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Pipeline stage an error record is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarvestStage {
    Gather,
    Fetch,
    Import,
}

impl std::fmt::Display for HarvestStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HarvestStage::Gather => "gather",
            HarvestStage::Fetch => "fetch",
            HarvestStage::Import => "import",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unknown harvest object '{0}'")]
    UnknownObject(String),
    #[error("store operation failed: {0}")]
    Backend(String),
}

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    Conflict(String),
    #[error("catalog request failed: {0}")]
    Request(String),
}

/// Job-level gather failures. Any of these aborts the whole job; per-object
/// errors never occur during gather.
#[derive(Error, Debug)]
pub enum GatherError {
    #[error("could not reach source {url}: {source}")]
    Connect {
        url: String,
        #[source]
        source: ProtocolError,
    },
    #[error("identifier listing failed for {url}: {source}")]
    Listing {
        url: String,
        #[source]
        source: ProtocolError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Object-level fetch failures. The object stays in its pre-content state
/// and may be retried by rerunning fetch for that object.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("endpoint client could not be built: {0}")]
    Client(#[source] ProtocolError),
    #[error("get record failed for {guid}: {source}")]
    GetRecord {
        guid: String,
        #[source]
        source: ProtocolError,
    },
    #[error("dumping the metadata failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Object-level import failures.
#[derive(Error, Debug)]
pub enum ImportError {
    /// The object was never fetched (or fetch failed): there is no content
    /// blob to import.
    #[error("harvest object has no content")]
    MissingContent,
    #[error("could not parse harvest object content: {0}")]
    Content(#[from] serde_json::Error),
    #[error(transparent)]
    Mapping(#[from] MapError),
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Store(#[from] StoreError),
}
