//! Orchestration services.

pub mod dependency_resolver;
pub mod executor;
pub mod health_monitor;
pub mod notifier;
pub mod registry;
pub mod retry;

pub use dependency_resolver::{DependencyResolver, EligibilityContext};
pub use executor::{ExecutorConfig, PipelineExecutor, PipelineOutcome, RunOptions};
pub use health_monitor::HealthMonitor;
pub use notifier::FailureNotifier;
pub use registry::AgentRegistry;
pub use retry::StoreRetryPolicy;
