//! Ports: traits at the seams between the domain and infrastructure.

pub mod agent_runner;
pub mod run_repository;

pub use agent_runner::{AgentOutcome, AgentRunner};
pub use run_repository::RunRepository;
