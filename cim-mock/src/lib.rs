//! In-memory WBEM server for tests
//!
//! [`MockWbem`] implements [`cim_core::WbemClient`] on top of a small CIM
//! repository: instances, association instances linking them by role,
//! scripted extrinsic method results and injected errors. Every operation is
//! journalled so tests can assert on what the code under test asked for.
//!
//! [`ArrayBuilder`] populates the repository with the object graph an SMI-S
//! provider exposes for a block array.

mod array;
mod connector;
mod repository;

pub use array::ArrayBuilder;
pub use connector::MockConnector;
pub use repository::{Call, FailOn, MockWbem};
