//! Shared data model for the catalyst orchestrator.
//!
//! This crate holds pure data: plans, tasks, usage records, backlog items,
//! and the small JSON/YAML-shaped files the orchestrator and agent use to
//! hand off state to each other. No I/O lives here -- see `catalyst-store`
//! for reading and writing these types to disk.

pub mod backlog;
pub mod claims;
pub mod handshake;
pub mod plan;
pub mod suspension;
pub mod usage;

pub use backlog::{BacklogItem, BacklogStatus, BacklogType};
pub use claims::{ClaimEntry, ClaimsFile, WorkerStatus};
pub use handshake::{HandshakeFile, HandshakeStatus};
pub use plan::{
    Budget, ModelEscalationConfig, Plan, PlanMeta, PlanRunStatus, Section, Task, TaskStatus,
    ValidationConfig, ValidationFinding, Verdict,
};
pub use suspension::SuspensionMarker;
pub use usage::{TaskResult, TaskUsage};
