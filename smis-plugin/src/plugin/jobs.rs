//! Extrinsic method invocation and the job tracker.

use cim_core::{CimInstance, CimInstanceName, MethodParams, WbemClient};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

use super::SmisPlugin;
use crate::config::JOB_POLL_INTERVAL;
use crate::error::{Result, SmisError};
use crate::ids::{self, EntityKind};
use crate::job::{
    self, Completion, InvokeOutcome, JobResult, JobState, JobStatusReport, JobToken, RetrieveKind,
    JOB_PROPERTIES,
};
use crate::mapper::{self, POOL_PROPERTIES, VOLUME_PROPERTIES};
use crate::metrics::{self, OperationTimer};
use crate::types::{JobStatus, Pool, Volume};

impl<C: WbemClient> SmisPlugin<C> {
    /// Invoke `method` on `object`.
    ///
    /// A synchronous success fetches the entity named by the output
    /// parameters when `retrieve` asks for one; an asynchronous start yields
    /// a token carrying `retrieve` for [`SmisPlugin::job_status`].
    pub(crate) async fn invoke(
        &self,
        method: &str,
        object: &CimInstanceName,
        params: MethodParams,
        retrieve: RetrieveKind,
    ) -> Result<Completion<Option<JobResult>>> {
        debug!(method, object = %object, "Invoking extrinsic method");
        let result = self.client.invoke_method(method, object, params).await?;
        match job::classify(method, result)? {
            InvokeOutcome::Done(result) => {
                let produced = match retrieve {
                    RetrieveKind::None => None,
                    RetrieveKind::Volume => {
                        match result.out_ref("TheElement").or_else(|| result.out_ref("TargetElement")) {
                            Some(path) => Some(JobResult::Volume(self.volume_at(path).await?)),
                            None => None,
                        }
                    }
                    RetrieveKind::Pool => {
                        let path = result.out_ref("Pool").ok_or_else(|| {
                            SmisError::InternalBug(format!("{} returned no new Pool", method))
                        })?;
                        Some(JobResult::Pool(self.pool_at(path).await?))
                    }
                };
                Ok(Completion::Done(produced))
            }
            InvokeOutcome::Job(job) => {
                let hash = self.job_hash(&job).await?;
                info!(method, job = %hash, "Provider started a job");
                Ok(Completion::Job(JobToken::new(hash, retrieve)))
            }
        }
    }

    /// Block until `completion` is terminal.
    pub(crate) async fn settle(&self, completion: Completion<Option<JobResult>>) -> Result<Option<JobResult>> {
        match completion {
            Completion::Done(result) => Ok(result),
            Completion::Job(token) => self.wait(&token).await,
        }
    }

    async fn job_hash(&self, job: &CimInstanceName) -> Result<String> {
        if let Some(instance_id) = job.key("InstanceID") {
            return Ok(ids::hash_id(&instance_id.to_string()));
        }
        let instance = self
            .client
            .get_instance(job, Some(EntityKind::Job.id_properties()))
            .await?;
        ids::derive_id(EntityKind::Job, &instance)
    }

    pub(crate) async fn volume_at(&self, path: &CimInstanceName) -> Result<Volume> {
        let instance = self.client.get_instance(path, Some(VOLUME_PROPERTIES)).await?;
        let pool_id = self.nav().pool_id_of_volume(&instance.path).await?;
        mapper::map_volume(&instance, &pool_id, None)
    }

    pub(crate) async fn pool_at(&self, path: &CimInstanceName) -> Result<Pool> {
        let instance = self.client.get_instance(path, Some(POOL_PROPERTIES)).await?;
        let nav = self.nav();
        let system_id = nav.pool_system_id(&instance.path).await?;
        let element_type = nav.pool_element_type(&instance).await?;
        mapper::map_pool(&instance, &system_id, element_type)
    }

    async fn job_result(&self, job: &CimInstanceName, retrieve: RetrieveKind) -> Result<Option<JobResult>> {
        let nav = self.nav();
        match retrieve {
            RetrieveKind::None => Ok(None),
            RetrieveKind::Volume => {
                match nav.affected_element(job, "CIM_StorageVolume", VOLUME_PROPERTIES).await? {
                    Some(volume) => Ok(Some(JobResult::Volume(self.volume_at(&volume.path).await?))),
                    None => Ok(None),
                }
            }
            RetrieveKind::Pool => {
                match nav.affected_element(job, "CIM_StoragePool", POOL_PROPERTIES).await? {
                    Some(pool) => Ok(Some(JobResult::Pool(self.pool_at(&pool.path).await?))),
                    None => Ok(None),
                }
            }
        }
    }

    async fn poll(&self, token: &JobToken) -> Result<JobStatusReport> {
        let job = self
            .nav()
            .find_by_id(EntityKind::Job, &token.hash, JOB_PROPERTIES)
            .await?
            .ok_or_else(|| SmisError::JobNotFound(token.hash.clone()))?;

        let report = match job::job_state_of(&job) {
            JobState::InProgress(percent) => JobStatusReport {
                status: JobStatus::InProgress,
                percent,
                result: None,
            },
            JobState::Completed { ok: true } => {
                let result = self.job_result(&job.path, token.retrieve).await?;
                self.release(&job, &token.hash).await;
                JobStatusReport {
                    status: JobStatus::Complete,
                    percent: 100,
                    result,
                }
            }
            JobState::Completed { ok: false } => JobStatusReport {
                status: JobStatus::Error,
                percent: 100,
                result: None,
            },
            JobState::Failed(description) => {
                metrics::record_job_poll("failed");
                return Err(SmisError::Plugin(description));
            }
        };
        metrics::record_job_poll(match report.status {
            JobStatus::InProgress => "in_progress",
            JobStatus::Complete => "complete",
            JobStatus::Error => "error",
        });
        Ok(report)
    }

    /// Delete a finished job unless the provider removes it by itself.
    async fn release(&self, job: &CimInstance, hash: &str) {
        if job.bool_prop("DeleteOnCompletion") == Some(true) {
            return;
        }
        match self.client.delete_instance(&job.path).await {
            Ok(()) => debug!(job = %hash, "Freed job"),
            Err(e) => warn!(job = %hash, error = %e, "Failed to delete finished job"),
        }
    }

    async fn free(&self, token: &JobToken) -> Result<()> {
        let job = self
            .nav()
            .instance_by_id(EntityKind::Job, &token.hash, &["DeleteOnCompletion"])
            .await?;
        self.release(&job, &token.hash).await;
        Ok(())
    }

    async fn wait(&self, token: &JobToken) -> Result<Option<JobResult>> {
        let deadline = Instant::now() + self.timeout;
        loop {
            let report = self.poll(token).await?;
            match report.status {
                JobStatus::Complete => return Ok(report.result),
                JobStatus::Error => {
                    return Err(SmisError::Plugin(format!(
                        "job {} finished with errors",
                        token.hash
                    )));
                }
                JobStatus::InProgress => {
                    if Instant::now() >= deadline {
                        return Err(SmisError::Plugin(format!(
                            "timed out after {} ms waiting for job {} ({}% done)",
                            self.timeout.as_millis(),
                            token.hash,
                            report.percent
                        )));
                    }
                    sleep(JOB_POLL_INTERVAL).await;
                }
            }
        }
    }

    // ========================================================================
    // Public job operations
    // ========================================================================

    /// Status, progress and (once complete) result of a job.
    ///
    /// A complete job is freed on the provider once its result is fetched.
    #[instrument(skip(self, token), fields(job = %token))]
    pub async fn job_status(&self, token: &JobToken) -> Result<JobStatusReport> {
        let timer = OperationTimer::new("job_status");
        timer.finish(self.poll(token).await)
    }

    /// Release the provider's job instance.
    #[instrument(skip(self, token), fields(job = %token))]
    pub async fn job_free(&self, token: &JobToken) -> Result<()> {
        let timer = OperationTimer::new("job_free");
        timer.finish(self.free(token).await)
    }

    /// Poll a job until it is terminal and return its result.
    ///
    /// Gives up with a plugin error once the session timeout has elapsed.
    #[instrument(skip(self, token), fields(job = %token))]
    pub async fn wait_job(&self, token: &JobToken) -> Result<Option<JobResult>> {
        let timer = OperationTimer::new("wait_job");
        timer.finish(self.wait(token).await)
    }
}
