//! Extrinsic method outcomes and provider job state.
//!
//! Every mutating operation goes through [`classify`]: the method either
//! finished (return code 0), failed, or handed back a `CIM_ConcreteJob` that
//! is tracked through a [`JobToken`] until it reaches a terminal state.

use std::fmt::{self, Display};
use std::str::FromStr;

use cim_core::{CimInstance, CimInstanceName, MethodResult};
use serde::{Deserialize, Serialize};

use crate::dmtf::{invoke, job_state, op_status};
use crate::error::{Result, SmisError};
use crate::types::{JobStatus, Pool, Volume};

/// Properties read when polling a job.
pub const JOB_PROPERTIES: &[&str] = &[
    "InstanceID",
    "JobState",
    "PercentComplete",
    "ErrorDescription",
    "OperationalStatus",
    "DeleteOnCompletion",
];

/// What to fetch once a job completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RetrieveKind {
    None,
    Volume,
    Pool,
}

impl RetrieveKind {
    fn tag(&self) -> u8 {
        match self {
            RetrieveKind::None => 0,
            RetrieveKind::Volume => 1,
            RetrieveKind::Pool => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(RetrieveKind::None),
            1 => Some(RetrieveKind::Volume),
            2 => Some(RetrieveKind::Pool),
            _ => None,
        }
    }
}

/// Handle on a running provider job.
///
/// `hash` is the derived id of the `CIM_ConcreteJob`. The `hash@tag` text
/// form exists for callers that need to store the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobToken {
    pub hash: String,
    pub retrieve: RetrieveKind,
}

impl JobToken {
    pub fn new(hash: impl Into<String>, retrieve: RetrieveKind) -> Self {
        Self {
            hash: hash.into(),
            retrieve,
        }
    }
}

impl Display for JobToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.hash, self.retrieve.tag())
    }
}

impl FromStr for JobToken {
    type Err = SmisError;

    /// A bare hash without `@tag` retrieves nothing.
    fn from_str(s: &str) -> Result<Self> {
        let Some((hash, tag)) = s.split_once('@') else {
            return Ok(JobToken::new(s, RetrieveKind::None));
        };
        let retrieve = tag
            .parse::<u8>()
            .ok()
            .and_then(RetrieveKind::from_tag)
            .ok_or_else(|| SmisError::JobNotFound(s.to_string()))?;
        Ok(JobToken::new(hash, retrieve))
    }
}

/// Result of a mutating call that may run asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion<T> {
    Done(T),
    Job(JobToken),
}

impl<T> Completion<T> {
    pub fn job(&self) -> Option<&JobToken> {
        match self {
            Completion::Job(token) => Some(token),
            Completion::Done(_) => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Completion<U> {
        match self {
            Completion::Done(value) => Completion::Done(f(value)),
            Completion::Job(token) => Completion::Job(token),
        }
    }
}

/// Entity produced by a completed job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum JobResult {
    Volume(Volume),
    Pool(Pool),
}

impl JobResult {
    pub fn into_volume(self) -> Option<Volume> {
        match self {
            JobResult::Volume(v) => Some(v),
            JobResult::Pool(_) => None,
        }
    }

    pub fn into_pool(self) -> Option<Pool> {
        match self {
            JobResult::Pool(p) => Some(p),
            JobResult::Volume(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusReport {
    pub status: JobStatus,
    pub percent: u8,
    pub result: Option<JobResult>,
}

// ============================================================================
// Method outcome classification
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum InvokeOutcome {
    /// Finished synchronously; output parameters may name the result
    Done(MethodResult),
    /// Running as this `CIM_ConcreteJob`
    Job(CimInstanceName),
}

/// Classify the return code of `method`.
pub fn classify(method: &str, result: MethodResult) -> Result<InvokeOutcome> {
    match result.return_value {
        invoke::OK => Ok(InvokeOutcome::Done(result)),
        invoke::ASYNC => match result.out_ref("Job") {
            Some(job) => Ok(InvokeOutcome::Job(job.clone())),
            None => Err(SmisError::InternalBug(format!(
                "{} returned a job without a Job reference",
                method
            ))),
        },
        invoke::NOT_SUPPORTED => Err(SmisError::NoSupport(format!(
            "{} is not supported by the provider",
            method
        ))),
        rc => Err(SmisError::Plugin(format!("Error: {} rc= {}", method, rc))),
    }
}

// ============================================================================
// Job state
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    InProgress(u8),
    Completed { ok: bool },
    Failed(String),
}

/// Providers disagree on the order of OK and COMPLETED in a finished job's
/// OperationalStatus.
pub fn completed_ok(codes: &[u64]) -> bool {
    codes.contains(&op_status::OK) && codes.contains(&op_status::COMPLETED)
}

pub fn job_state_of(job: &CimInstance) -> JobState {
    match job.u64_prop("JobState") {
        Some(job_state::NEW | job_state::STARTING | job_state::RUNNING) => {
            let percent = job.u64_prop("PercentComplete").unwrap_or(0).min(100);
            JobState::InProgress(percent as u8)
        }
        Some(job_state::COMPLETED) => JobState::Completed {
            ok: completed_ok(&job.u64_array("OperationalStatus")),
        },
        _ => JobState::Failed(job.str_prop("ErrorDescription").unwrap_or_default().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cim_core::CimValue;

    fn job(state: u64) -> CimInstance {
        CimInstance::new(CimInstanceName::new("CIM_ConcreteJob").with_key("InstanceID", "J1"))
            .with("JobState", state)
    }

    #[test]
    fn test_token_text_form() {
        let token = JobToken::new("abc123", RetrieveKind::Volume);
        assert_eq!(token.to_string(), "abc123@1");
        assert_eq!("abc123@1".parse::<JobToken>().unwrap(), token);
        assert_eq!(
            "abc123".parse::<JobToken>().unwrap().retrieve,
            RetrieveKind::None
        );
        assert!(matches!(
            "abc123@9".parse::<JobToken>(),
            Err(SmisError::JobNotFound(_))
        ));
    }

    #[test]
    fn test_classify_return_codes() {
        let job_path = CimInstanceName::new("CIM_ConcreteJob").with_key("InstanceID", "J1");

        let done = classify("ReturnToStoragePool", MethodResult::new(0)).unwrap();
        assert!(matches!(done, InvokeOutcome::Done(_)));

        let pending = classify(
            "ReturnToStoragePool",
            MethodResult::new(4096).with_out("Job", job_path.clone()),
        )
        .unwrap();
        assert_eq!(pending, InvokeOutcome::Job(job_path));

        assert!(matches!(
            classify("HidePaths", MethodResult::new(1)),
            Err(SmisError::NoSupport(_))
        ));

        let err = classify("ExposePaths", MethodResult::new(4)).unwrap_err();
        assert!(matches!(err, SmisError::Plugin(ref m) if m == "Error: ExposePaths rc= 4"));

        assert!(matches!(
            classify("ExposePaths", MethodResult::new(4096)),
            Err(SmisError::InternalBug(_))
        ));
    }

    #[test]
    fn test_job_states() {
        let running = job(job_state::RUNNING).with("PercentComplete", 250u64);
        assert_eq!(job_state_of(&running), JobState::InProgress(100));

        let done = job(job_state::COMPLETED).with(
            "OperationalStatus",
            CimValue::Array(vec![CimValue::Uint(17), CimValue::Uint(2)]),
        );
        assert_eq!(job_state_of(&done), JobState::Completed { ok: true });

        let broken = job(job_state::COMPLETED).with(
            "OperationalStatus",
            CimValue::Array(vec![CimValue::Uint(6), CimValue::Uint(17)]),
        );
        assert_eq!(job_state_of(&broken), JobState::Completed { ok: false });

        let killed = job(job_state::KILLED).with("ErrorDescription", "array offline");
        assert_eq!(job_state_of(&killed), JobState::Failed("array offline".into()));
    }
}
