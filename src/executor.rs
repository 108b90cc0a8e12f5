use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::harvest::pipeline::OaiHarvester;
use crate::harvest::traits::{CatalogApi, ObjectStore};
use crate::model::HarvestObject;

/// Runs per-object stages over a batch of harvest objects with a bounded
/// worker pool. Each object's read/write set is disjoint, so fetch and
/// import parallelize safely; gather pagination stays sequential and is not
/// handled here. Per-object failures are already recorded on the objects by
/// the harvester — the batch never aborts.
pub struct StageExecutor {
    semaphore: Arc<Semaphore>,
}

impl StageExecutor {
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(concurrency_limit)),
        }
    }

    /// Fetches every object, at most `concurrency_limit` in flight.
    /// Completion order is not preserved.
    #[instrument(skip(self, harvester, objects))]
    pub async fn fetch_all<C, S>(
        &self,
        harvester: Arc<OaiHarvester<C, S>>,
        objects: Vec<HarvestObject>,
    ) -> Vec<HarvestObject>
    where
        C: CatalogApi + 'static,
        S: ObjectStore + 'static,
    {
        info!(count = objects.len(), "starting fetch batch");
        self.run_stage(objects, move |mut object| {
            let harvester = Arc::clone(&harvester);
            async move {
                if let Err(e) = harvester.fetch(&mut object).await {
                    warn!(guid = %object.guid, error = %e, "fetch failed");
                }
                object
            }
        })
        .await
    }

    /// Imports every object, at most `concurrency_limit` in flight.
    #[instrument(skip(self, harvester, objects))]
    pub async fn import_all<C, S>(
        &self,
        harvester: Arc<OaiHarvester<C, S>>,
        objects: Vec<HarvestObject>,
    ) -> Vec<HarvestObject>
    where
        C: CatalogApi + 'static,
        S: ObjectStore + 'static,
    {
        info!(count = objects.len(), "starting import batch");
        self.run_stage(objects, move |mut object| {
            let harvester = Arc::clone(&harvester);
            async move {
                if let Err(e) = harvester.import(&mut object).await {
                    warn!(guid = %object.guid, error = %e, "import failed");
                }
                object
            }
        })
        .await
    }

    async fn run_stage<F, Fut>(&self, objects: Vec<HarvestObject>, stage: F) -> Vec<HarvestObject>
    where
        F: Fn(HarvestObject) -> Fut,
        Fut: Future<Output = HarvestObject> + Send + 'static,
    {
        let mut tasks = JoinSet::new();
        for object in objects {
            let semaphore = Arc::clone(&self.semaphore);
            let task = stage(object);
            tasks.spawn(async move {
                // The semaphore is never closed; acquire_owned cannot fail.
                let _permit = semaphore.acquire_owned().await.ok();
                task.await
            });
        }

        let mut finished = Vec::with_capacity(tasks.len());
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(object) => finished.push(object),
                Err(e) => warn!(error = %e, "stage task failed to complete"),
            }
        }
        finished
    }
}
