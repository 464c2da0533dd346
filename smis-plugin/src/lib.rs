//! SMI-S Storage Adapter Library
//!
//! Exposes systems, pools, volumes, disks, access groups, initiators and
//! target ports of an SMI-S provider through a vendor-neutral API. The
//! provider is reached through the [`cim_core::WbemClient`] trait.
//!
//! The library is split into several modules:
//! - `plugin`: the [`SmisPlugin`] facade and its operations
//! - `profile` / `session`: profile negotiation and the per-session context
//! - `navigator`: association walks between CIM classes
//! - `mapper` / `target_ports` / `raid`: CIM instances to domain entities
//! - `job`: method outcome classification and job tokens
//! - `ids`: stable identifiers
//! - `metrics`: operation counters and timings

pub mod capabilities;
pub mod config;
pub mod dmtf;
pub mod error;
pub mod ids;
pub mod job;
pub mod mapper;
pub mod metrics;
pub mod navigator;
pub mod plugin;
pub mod profile;
pub mod quirks;
pub mod raid;
pub mod session;
pub mod target_ports;
pub mod types;

pub use capabilities::{Capability, CapabilitySet};
pub use config::ConnectionConfig;
pub use error::{ErrorCode, Result, SmisError};
pub use job::{Completion, JobResult, JobStatusReport, JobToken, RetrieveKind};
pub use plugin::{PluginInfo, SmisPlugin};
pub use profile::{Profile, SpecVersion};
pub use session::SessionContext;
pub use types::*;
