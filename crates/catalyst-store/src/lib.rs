//! Filesystem persistence for the catalyst orchestrator.
//!
//! Every shape in `catalyst-types` has a corresponding module here that
//! knows how to read and write it at its well-known path under a
//! project root (see [`paths::StoreRoot`]). There is no database: the
//! filesystem *is* the store, exactly as spec 3.7 assigns ownership of
//! each file to exactly one of the Executor, the Pipeline, or the
//! Bridge.

pub mod backlog;
pub mod claims;
pub mod error;
pub mod handshake;
pub mod paths;
pub mod plan;
pub mod stop;
pub mod suspension;
pub mod usage_report;

pub use error::{Result, StoreError};
pub use paths::StoreRoot;
