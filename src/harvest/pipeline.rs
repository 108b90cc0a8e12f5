//! Harvest pipeline coordinator.
//!
//! This module provides the [`OaiHarvester`] that executes the three
//! harvest stages (gather → fetch → import) against one OAI-PMH source:
//! - Async execution via `tokio`, with per-request timeouts
//! - Structured logging via `tracing`
//! - Job-level errors for gather, per-object errors for fetch/import —
//!   an object failure never aborts the batch
//! - Cooperative cancellation of the gather loop via `CancellationToken`

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::HarvestConfig;
use crate::metadata::MetadataRegistry;
use crate::model::{
    ContentMap, FieldValue, GroupDict, HarvestJob, HarvestObject, HarvesterInfo, ObjectState,
    PackageDict,
};
use crate::munge::munge_title_to_name;
use crate::oai::{OaiClient, ProtocolError};

use super::mapper;
use super::traits::{
    CatalogApi, CatalogError, FetchError, GatherError, HarvestStage, ImportError, ObjectStore,
};

/// Post-processing hook run on each package after mapping and before
/// submission. Must be pure: no side effects, same output for same input.
pub type PackagePostProcess = Box<dyn Fn(&ContentMap, PackageDict) -> PackageDict + Send + Sync>;

// ============================================================================
// Harvester
// ============================================================================

/// OAI-PMH harvester over a catalog API and an object store.
///
/// Each stage re-resolves the source configuration from the job, builds a
/// fresh protocol client and runs independently, so fetch and import can be
/// re-invoked for individual objects in any order across distinct objects.
///
/// # Example
///
/// ```ignore
/// let harvester = OaiHarvester::new(catalog, store)
///     .with_timeout(Duration::from_secs(60));
///
/// let ids = harvester.gather(&job).await?;
/// for mut object in load(ids) {
///     if harvester.fetch(&mut object).await.is_ok() {
///         harvester.import(&mut object).await.ok();
///     }
/// }
/// ```
pub struct OaiHarvester<C, S>
where
    C: CatalogApi,
    S: ObjectStore,
{
    catalog: C,
    store: S,
    registry: Arc<MetadataRegistry>,
    request_timeout: Duration,
    post_process: Option<PackagePostProcess>,
}

impl<C, S> OaiHarvester<C, S>
where
    C: CatalogApi,
    S: ObjectStore,
{
    /// Creates a harvester with the stock reader registry (`oai_dc`,
    /// `oai_ddi`) and a 30 second request timeout.
    pub fn new(catalog: C, store: S) -> Self {
        Self {
            catalog,
            store,
            registry: Arc::new(MetadataRegistry::with_default_readers()),
            request_timeout: Duration::from_secs(30),
            post_process: None,
        }
    }

    /// Replaces the metadata reader registry.
    pub fn with_registry(mut self, registry: Arc<MetadataRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Sets the timeout applied to every protocol request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Installs a pure package post-processing hook.
    pub fn with_post_process(mut self, hook: PackagePostProcess) -> Self {
        self.post_process = Some(hook);
        self
    }

    /// Static capability descriptor for the invoking scheduler.
    pub fn info(&self) -> HarvesterInfo {
        HarvesterInfo {
            name: "oai_pmh",
            title: "OAI-PMH Harvester",
            description: "Harvester for OAI-PMH data sources",
        }
    }

    fn client_for(
        &self,
        url: &str,
        config: &HarvestConfig,
    ) -> Result<OaiClient, ProtocolError> {
        let http = reqwest::Client::builder()
            .timeout(self.request_timeout)
            .build()?;
        Ok(OaiClient::new(http, url, Arc::clone(&self.registry))
            .with_credentials(config.credentials.clone())
            .with_force_http_get(config.force_http_get))
    }

    // ========================================================================
    // Gather
    // ========================================================================

    /// Discovers all record identifiers for the job and creates one pending
    /// harvest object per surviving header.
    ///
    /// Returns the ordered ids of the created objects. Connection and
    /// listing failures are job-level: one gather error is recorded and the
    /// job performs no further processing. Objects created before a
    /// mid-stream listing error remain valid work items.
    #[instrument(skip(self, job), fields(job = %job.id, source = %job.source.url))]
    pub async fn gather(&self, job: &HarvestJob) -> Result<Vec<String>, GatherError> {
        self.gather_cancellable(job, &CancellationToken::new()).await
    }

    /// [`gather`](Self::gather) with cooperative cancellation: when `cancel`
    /// fires, no new listing calls are issued and the ids gathered so far
    /// are returned.
    pub async fn gather_cancellable(
        &self,
        job: &HarvestJob,
        cancel: &CancellationToken,
    ) -> Result<Vec<String>, GatherError> {
        info!("gather stage started");
        let config = HarvestConfig::from_source(&job.source.config);

        let client = match self.client_for(&job.source.url, &config) {
            Ok(client) => client,
            Err(e) => {
                let gather_error = GatherError::Connect {
                    url: job.source.url.clone(),
                    source: e,
                };
                self.record_gather_error(job, &gather_error.to_string()).await;
                return Err(gather_error);
            }
        };

        // Liveness check; any failure here aborts the whole job.
        if let Err(e) = client.identify().await {
            let gather_error = GatherError::Connect {
                url: job.source.url.clone(),
                source: e,
            };
            self.record_gather_error(job, &gather_error.to_string()).await;
            return Err(gather_error);
        }

        let mut pages =
            client.list_identifiers(&config.metadata_prefix, config.set_spec.as_deref());
        let mut object_ids = Vec::new();

        loop {
            if cancel.is_cancelled() {
                info!(gathered = object_ids.len(), "gather cancelled");
                break;
            }
            let header = match pages.next().await {
                None => break,
                Some(Ok(header)) => header,
                Some(Err(e)) => {
                    let gather_error = GatherError::Listing {
                        url: job.source.url.clone(),
                        source: e,
                    };
                    self.record_gather_error(job, &gather_error.to_string()).await;
                    return Err(gather_error);
                }
            };

            if header.deleted {
                debug!(identifier = %header.identifier, "skipping deleted record");
                continue;
            }
            if let Some(filter) = &config.set_filter {
                if !header.set_spec.contains(filter) {
                    warn!(
                        identifier = %header.identifier,
                        sets = ?header.set_spec,
                        filter = %filter,
                        "set filter does not match, skipping"
                    );
                    continue;
                }
            }

            let object = self.store.create_object(&header.identifier, job).await?;
            debug!(object = %object.id, guid = %object.guid, "harvest object created");
            object_ids.push(object.id);
        }

        info!(count = object_ids.len(), "gather stage finished");
        Ok(object_ids)
    }

    // ========================================================================
    // Fetch
    // ========================================================================

    /// Retrieves and decodes one record, then persists the serialized
    /// content blob on the object.
    ///
    /// Every failure path records a human-readable object error and marks
    /// the object fetch-failed; nothing propagates past the per-object
    /// boundary. Invoking fetch twice against an unchanged remote record
    /// produces byte-identical content.
    #[instrument(skip(self, object), fields(guid = %object.guid))]
    pub async fn fetch(&self, object: &mut HarvestObject) -> Result<(), FetchError> {
        info!("fetch stage started");
        let config = HarvestConfig::from_source(&object.job.source.config);

        let client = match self.client_for(&object.job.source.url, &config) {
            Ok(client) => client,
            Err(e) => {
                let fetch_error = FetchError::Client(e);
                self.fail_object(
                    object,
                    HarvestStage::Fetch,
                    ObjectState::FetchFailed,
                    &fetch_error.to_string(),
                )
                .await;
                return Err(fetch_error);
            }
        };

        let (header, mut content, _raw) = match client
            .get_record(&object.guid, &config.metadata_prefix)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                let fetch_error = FetchError::GetRecord {
                    guid: object.guid.clone(),
                    source: e,
                };
                self.fail_object(
                    object,
                    HarvestStage::Fetch,
                    ObjectState::FetchFailed,
                    &fetch_error.to_string(),
                )
                .await;
                return Err(fetch_error);
            }
        };

        // An unparsable datestamp is non-fatal; the key is simply omitted.
        if let Some(modified) = header
            .datestamp
            .as_deref()
            .and_then(mapper::normalize_datetime)
        {
            content.insert("metadata_modified", FieldValue::Scalar(modified));
        }
        content.insert("set_spec", FieldValue::List(header.set_spec.clone()));

        let serialized = match serde_json::to_string(&content) {
            Ok(serialized) => serialized,
            Err(e) => {
                let fetch_error = FetchError::Serialize(e);
                self.fail_object(
                    object,
                    HarvestStage::Fetch,
                    ObjectState::FetchFailed,
                    &fetch_error.to_string(),
                )
                .await;
                return Err(fetch_error);
            }
        };

        if let Err(e) = self.store.save_content(&object.id, &serialized).await {
            self.fail_object(
                object,
                HarvestStage::Fetch,
                ObjectState::FetchFailed,
                &format!("saving fetched content failed: {e}"),
            )
            .await;
            return Err(FetchError::Store(e));
        }

        object.content = Some(serialized);
        object.state = ObjectState::Fetched;
        info!("fetch stage finished");
        Ok(())
    }

    // ========================================================================
    // Import
    // ========================================================================

    /// Maps one fetched object into a package and submits it to the
    /// catalog. Returns the catalog package id.
    ///
    /// Nothing is partially committed: the package reference is saved and
    /// the object marked current only after the catalog upsert succeeded,
    /// followed by the store's transaction commit.
    #[instrument(skip(self, object), fields(guid = %object.guid))]
    pub async fn import(&self, object: &mut HarvestObject) -> Result<String, ImportError> {
        info!("import stage started");

        let Some(raw) = object.content.clone() else {
            let import_error = ImportError::MissingContent;
            self.fail_object(
                object,
                HarvestStage::Import,
                ObjectState::ImportFailed,
                &import_error.to_string(),
            )
            .await;
            return Err(import_error);
        };

        let content: ContentMap = match serde_json::from_str(&raw) {
            Ok(content) => content,
            Err(e) => {
                let import_error = ImportError::Content(e);
                self.fail_object(
                    object,
                    HarvestStage::Import,
                    ObjectState::ImportFailed,
                    &import_error.to_string(),
                )
                .await;
                return Err(import_error);
            }
        };

        let name = munge_title_to_name(&object.guid);

        // The source's catalog dataset carries the owning organization.
        let owner_org = match self.catalog.package_show(&object.job.source.id).await {
            Ok(source_package) => source_package.owner_org,
            Err(e) => {
                self.fail_object(
                    object,
                    HarvestStage::Import,
                    ObjectState::ImportFailed,
                    &format!("resolving owning organization failed: {e}"),
                )
                .await;
                return Err(ImportError::Catalog(e));
            }
        };

        let mut package = match mapper::build_package(&name, &content) {
            Ok(package) => package,
            Err(e) => {
                self.fail_object(
                    object,
                    HarvestStage::Import,
                    ObjectState::ImportFailed,
                    &format!("field mapping failed for {}: {e}", object.guid),
                )
                .await;
                return Err(ImportError::Mapping(e));
            }
        };
        package.owner_org = owner_org;

        match self.find_or_create_groups(content.values("series")).await {
            Ok(groups) => package.groups = groups,
            Err(e) => {
                self.fail_object(
                    object,
                    HarvestStage::Import,
                    ObjectState::ImportFailed,
                    &format!("resolving groups failed: {e}"),
                )
                .await;
                return Err(ImportError::Catalog(e));
            }
        }

        if let Some(hook) = &self.post_process {
            package = hook(&content, package);
        }

        let created = match self.catalog.package_create_or_update(&package).await {
            Ok(created) => created,
            Err(e) => {
                self.fail_object(
                    object,
                    HarvestStage::Import,
                    ObjectState::ImportFailed,
                    &format!("create or update package failed for {}: {e}", object.guid),
                )
                .await;
                return Err(ImportError::Catalog(e));
            }
        };

        if let Err(e) = self.store.save_package(&object.id, &created.id).await {
            self.fail_object(
                object,
                HarvestStage::Import,
                ObjectState::ImportFailed,
                &format!("saving package reference failed: {e}"),
            )
            .await;
            return Err(ImportError::Store(e));
        }
        if let Err(e) = self.store.commit().await {
            self.fail_object(
                object,
                HarvestStage::Import,
                ObjectState::ImportFailed,
                &format!("commit failed: {e}"),
            )
            .await;
            return Err(ImportError::Store(e));
        }

        object.package_id = Some(created.id.clone());
        object.current = true;
        object.state = ObjectState::Imported;
        info!(package = %created.id, "import stage finished");
        Ok(created.id)
    }

    /// Resolves each group name to a catalog group id, creating missing
    /// groups. Concurrent creation of the same group is tolerated: a
    /// conflict on create falls back to one more lookup.
    async fn find_or_create_groups(
        &self,
        names: &[String],
    ) -> Result<Vec<String>, CatalogError> {
        let mut group_ids = Vec::with_capacity(names.len());
        for group_name in names {
            let group_dict = GroupDict {
                id: group_name.clone(),
                name: munge_title_to_name(group_name),
                title: group_name.clone(),
            };
            let group = match self.catalog.group_show(&group_dict.id).await {
                Ok(group) => group,
                Err(CatalogError::NotFound(_)) => {
                    match self.catalog.group_create(&group_dict).await {
                        Ok(group) => group,
                        Err(CatalogError::Conflict(_)) => {
                            self.catalog.group_show(&group_dict.id).await?
                        }
                        Err(e) => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            };
            debug!(group = %group.id, "group resolved");
            group_ids.push(group.id);
        }
        Ok(group_ids)
    }

    // ========================================================================
    // Error recording
    // ========================================================================

    async fn fail_object(
        &self,
        object: &mut HarvestObject,
        stage: HarvestStage,
        state: ObjectState,
        message: &str,
    ) {
        error!(guid = %object.guid, %stage, message);
        object.state = state;
        if let Err(e) = self
            .store
            .save_object_error(&object.id, stage, message)
            .await
        {
            warn!(error = %e, "failed to persist object error");
        }
    }

    async fn record_gather_error(&self, job: &HarvestJob, message: &str) {
        error!(job = %job.id, message);
        if let Err(e) = self.store.save_gather_error(&job.id, message).await {
            warn!(error = %e, "failed to persist gather error");
        }
    }
}
