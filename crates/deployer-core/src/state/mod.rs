//! State management for deployments.
//!
//! This module owns every mutation of a [`deployer_types::DeployRecord`]:
//! which step may run at which stage, how a successful step advances the
//! record, and how records and their logs are persisted.

pub mod deploy;

pub use deploy::{step_of, DeployStateMachine, Transition};
