//! Agent descriptor registry.
//!
//! Builds the built-in analysis agents, applies configuration overrides, and
//! validates the dependency graph once per process start.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::domain::errors::{PipelineError, PipelineResult};
use crate::domain::models::{AgentCommand, AgentDescriptor, Config};

/// Built-in defaults for one agent, before configuration overrides.
struct BuiltinAgent {
    name: &'static str,
    script: &'static str,
    dependencies: &'static [&'static str],
    timeout_secs: u64,
    max_retries: u32,
    schedule_interval_secs: u64,
}

/// The four analysis agents in declaration (dependency) order.
const BUILTIN_AGENTS: &[BuiltinAgent] = &[
    BuiltinAgent {
        name: "pattern_recognition",
        script: "agents/pattern-recognition/agent.py",
        dependencies: &[],
        timeout_secs: 300,
        max_retries: 3,
        schedule_interval_secs: 900,
    },
    BuiltinAgent {
        name: "business_intelligence",
        script: "agents/business-intelligence/agent.py",
        dependencies: &["pattern_recognition"],
        timeout_secs: 600,
        max_retries: 3,
        schedule_interval_secs: 3600,
    },
    BuiltinAgent {
        name: "ab_testing",
        script: "agents/ab-testing/agent.py",
        dependencies: &["business_intelligence"],
        timeout_secs: 900,
        max_retries: 2,
        schedule_interval_secs: 86400,
    },
    BuiltinAgent {
        name: "insights_engine",
        script: "agents/insights-engine/agent.py",
        dependencies: &["pattern_recognition", "business_intelligence", "ab_testing"],
        timeout_secs: 600,
        max_retries: 3,
        schedule_interval_secs: 3600,
    },
];

const DEFAULT_BACKOFF_BASE_MS: u64 = 2000;
const DEFAULT_BACKOFF_FACTOR: f64 = 2.0;

/// Immutable registry of agent descriptors in declaration order.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    agents: Vec<AgentDescriptor>,
}

impl AgentRegistry {
    /// Build the registry from configuration and validate it.
    pub fn from_config(config: &Config) -> PipelineResult<Self> {
        let agents = BUILTIN_AGENTS
            .iter()
            .map(|builtin| {
                let overrides = config.agents.get(builtin.name);

                let timeout_secs = overrides
                    .and_then(|o| o.timeout_seconds)
                    .unwrap_or(builtin.timeout_secs);
                let max_retries = overrides
                    .and_then(|o| o.max_retries)
                    .unwrap_or(builtin.max_retries);
                let backoff_base_ms = overrides
                    .and_then(|o| o.backoff_base_ms)
                    .unwrap_or(DEFAULT_BACKOFF_BASE_MS);
                let backoff_factor = overrides
                    .and_then(|o| o.backoff_factor)
                    .unwrap_or(DEFAULT_BACKOFF_FACTOR);
                let schedule_interval_secs = overrides
                    .and_then(|o| o.schedule_interval_seconds)
                    .unwrap_or(builtin.schedule_interval_secs);

                AgentDescriptor {
                    name: builtin.name.to_string(),
                    command: AgentCommand::new(
                        config.python_env.clone(),
                        vec![builtin.script.to_string()],
                    ),
                    dependencies: builtin
                        .dependencies
                        .iter()
                        .map(ToString::to_string)
                        .collect(),
                    timeout: Duration::from_secs(timeout_secs),
                    max_retries,
                    backoff_base: Duration::from_millis(backoff_base_ms),
                    backoff_factor,
                    schedule_interval: Duration::from_secs(schedule_interval_secs),
                }
            })
            .collect();

        let registry = Self::from_descriptors(agents)?;
        registry.validate_policies()?;
        Ok(registry)
    }

    /// Build a registry from explicit descriptors (used by tests and by
    /// `from_config`). Validates that dependencies exist and the graph is
    /// acyclic.
    pub fn from_descriptors(agents: Vec<AgentDescriptor>) -> PipelineResult<Self> {
        let registry = Self { agents };
        registry.validate_graph()?;
        Ok(registry)
    }

    /// Descriptors in declaration order.
    pub fn list(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    /// Look up a descriptor by name.
    pub fn get(&self, name: &str) -> PipelineResult<&AgentDescriptor> {
        self.agents
            .iter()
            .find(|agent| agent.name == name)
            .ok_or_else(|| PipelineError::AgentNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        self.agents.iter().map(|a| a.name.clone()).collect()
    }

    fn validate_graph(&self) -> PipelineResult<()> {
        let names: HashSet<&str> = self.agents.iter().map(|a| a.name.as_str()).collect();
        if names.len() != self.agents.len() {
            return Err(PipelineError::Config(
                "duplicate agent names in registry".to_string(),
            ));
        }

        for agent in &self.agents {
            for dep in &agent.dependencies {
                if dep == &agent.name {
                    return Err(PipelineError::Config(format!(
                        "agent {} depends on itself",
                        agent.name
                    )));
                }
                if !names.contains(dep.as_str()) {
                    return Err(PipelineError::Config(format!(
                        "agent {} depends on unknown agent {dep}",
                        agent.name
                    )));
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(PipelineError::DependencyCycle(cycle));
        }
        Ok(())
    }

    fn validate_policies(&self) -> PipelineResult<()> {
        for agent in &self.agents {
            if agent.max_retries == 0 {
                return Err(PipelineError::Config(format!(
                    "agent {}: max_retries cannot be 0",
                    agent.name
                )));
            }
            if agent.timeout.is_zero() {
                return Err(PipelineError::Config(format!(
                    "agent {}: timeout cannot be 0",
                    agent.name
                )));
            }
            if agent.backoff_factor < 1.0 {
                return Err(PipelineError::Config(format!(
                    "agent {}: backoff_factor must be >= 1.0",
                    agent.name
                )));
            }
            if agent.schedule_interval.is_zero() {
                return Err(PipelineError::Config(format!(
                    "agent {}: schedule_interval cannot be 0",
                    agent.name
                )));
            }
        }
        Ok(())
    }

    /// DFS cycle detection; returns the cycle path when one exists.
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let graph: HashMap<&str, Vec<&str>> = self
            .agents
            .iter()
            .map(|agent| {
                (
                    agent.name.as_str(),
                    agent.dependencies.iter().map(String::as_str).collect(),
                )
            })
            .collect();

        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for agent in &self.agents {
            if !visited.contains(agent.name.as_str())
                && detect_cycle_util(
                    agent.name.as_str(),
                    &graph,
                    &mut visited,
                    &mut rec_stack,
                    &mut path,
                )
            {
                return Some(path.iter().map(ToString::to_string).collect());
            }
        }
        None
    }
}

fn detect_cycle_util<'a>(
    node: &'a str,
    graph: &HashMap<&'a str, Vec<&'a str>>,
    visited: &mut HashSet<&'a str>,
    rec_stack: &mut HashSet<&'a str>,
    path: &mut Vec<&'a str>,
) -> bool {
    visited.insert(node);
    rec_stack.insert(node);
    path.push(node);

    if let Some(neighbors) = graph.get(node) {
        for &neighbor in neighbors {
            if !visited.contains(neighbor) {
                if detect_cycle_util(neighbor, graph, visited, rec_stack, path) {
                    return true;
                }
            } else if rec_stack.contains(neighbor) {
                if let Some(cycle_start) = path.iter().position(|&n| n == neighbor) {
                    path.drain(0..cycle_start);
                    return true;
                }
            }
        }
    }

    rec_stack.remove(node);
    path.pop();
    false
}
