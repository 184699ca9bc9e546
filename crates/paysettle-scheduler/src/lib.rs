//! # paysettle-scheduler
//!
//! Time-triggered settlement work: auto-release, dispute timeouts, evidence
//! cleanup, auto-withdrawal, subscription renewal and the EOR payroll
//! cycle. Each job is idempotent per run, runs in its own error boundary and
//! never overlaps itself.
//!
//! The `settlementd` binary wires the jobs to an in-memory settlement core.

pub mod jobs;
pub mod scheduler;

pub use jobs::{settlement_jobs, settlement_scheduler};
pub use scheduler::{Job, JobRunner, RunOutcome, Scheduler, SchedulerHandle};
