//! Agent runner adapters.

pub mod mock;
pub mod runner;

pub use mock::{MockAgentRunner, MockOutcome};
pub use runner::ProcessAgentRunner;
