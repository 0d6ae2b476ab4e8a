//! Dependency resolution over the agent graph.
//!
//! Pure functions of the registry plus a point-in-time view of the run state.
//! The resolver never touches the store itself; the execution engine builds
//! an [`EligibilityContext`] from repository reads and asks the resolver
//! which agents may run now.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::domain::models::AgentDescriptor;
use crate::services::registry::AgentRegistry;

/// Point-in-time view the resolver decides against.
#[derive(Debug, Clone)]
pub struct EligibilityContext {
    /// Most recent success time per agent, across all runs.
    pub last_success: HashMap<String, DateTime<Utc>>,
    /// Agents with a Running record for the current run.
    pub running: HashSet<String>,
    /// Maximum age of a dependency's last success for it to satisfy gating.
    pub dependency_max_age: Duration,
    /// Bypass dependency gating (never the at-most-one-Running invariant).
    pub force: bool,
    pub now: DateTime<Utc>,
}

impl EligibilityContext {
    pub fn new(dependency_max_age: Duration) -> Self {
        Self {
            last_success: HashMap::new(),
            running: HashSet::new(),
            dependency_max_age,
            force: false,
            now: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Agents eligible to run now, in registry declaration order.
    ///
    /// An agent is eligible when every dependency has a sufficiently fresh
    /// terminal success and the agent has no Running record. `force` bypasses
    /// the dependency check only.
    pub fn eligible(&self, registry: &AgentRegistry, ctx: &EligibilityContext) -> Vec<String> {
        registry
            .list()
            .iter()
            .filter(|agent| !ctx.running.contains(&agent.name))
            .filter(|agent| ctx.force || self.unmet_dependencies(agent, ctx).is_empty())
            .map(|agent| agent.name.clone())
            .collect()
    }

    /// Dependencies of `agent` that do not satisfy gating: never succeeded,
    /// or last success older than the freshness window.
    pub fn unmet_dependencies(
        &self,
        agent: &AgentDescriptor,
        ctx: &EligibilityContext,
    ) -> Vec<String> {
        agent
            .dependencies
            .iter()
            .filter(|dep| {
                match ctx.last_success.get(dep.as_str()) {
                    Some(at) => {
                        let age = (ctx.now - *at).to_std().unwrap_or(Duration::ZERO);
                        age > ctx.dependency_max_age
                    }
                    None => true,
                }
            })
            .cloned()
            .collect()
    }

    /// Full execution order: Kahn's algorithm with ties broken by declaration
    /// order, so the result is deterministic for any DAG shape.
    pub fn execution_order(&self, registry: &AgentRegistry) -> Vec<String> {
        let agents = registry.list();
        let index: HashMap<&str, usize> = agents
            .iter()
            .enumerate()
            .map(|(i, a)| (a.name.as_str(), i))
            .collect();

        let mut in_degree: Vec<usize> = agents.iter().map(|a| a.dependencies.len()).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); agents.len()];
        for (i, agent) in agents.iter().enumerate() {
            for dep in &agent.dependencies {
                if let Some(&dep_idx) = index.get(dep.as_str()) {
                    dependents[dep_idx].push(i);
                }
            }
        }

        let mut order = Vec::with_capacity(agents.len());
        let mut ready: Vec<usize> = (0..agents.len()).filter(|&i| in_degree[i] == 0).collect();

        while !ready.is_empty() {
            // Lowest declaration index first.
            ready.sort_unstable();
            let next = ready.remove(0);
            order.push(agents[next].name.clone());

            for &dependent in &dependents[next] {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        // Registry construction already rejected cycles.
        debug_assert_eq!(order.len(), agents.len());
        order
    }

    /// Every agent that transitively depends on `name`.
    pub fn transitive_dependents(
        &self,
        registry: &AgentRegistry,
        name: &str,
    ) -> HashSet<String> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for agent in registry.list() {
            for dep in &agent.dependencies {
                reverse
                    .entry(dep.as_str())
                    .or_default()
                    .push(agent.name.as_str());
            }
        }

        let mut result = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        while let Some(current) = queue.pop_front() {
            if let Some(dependents) = reverse.get(current) {
                for &dependent in dependents {
                    if result.insert(dependent.to_string()) {
                        queue.push_back(dependent);
                    }
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AgentCommand, Config};
    use chrono::Duration as ChronoDuration;

    fn registry() -> AgentRegistry {
        AgentRegistry::from_config(&Config::default()).unwrap()
    }

    fn descriptor(name: &str, deps: &[&str]) -> AgentDescriptor {
        AgentDescriptor {
            name: name.to_string(),
            command: AgentCommand::new(name, vec![]),
            dependencies: deps.iter().map(ToString::to_string).collect(),
            timeout: Duration::from_secs(60),
            max_retries: 3,
            backoff_base: Duration::from_millis(100),
            backoff_factor: 2.0,
            schedule_interval: Duration::from_secs(900),
        }
    }

    fn context() -> EligibilityContext {
        EligibilityContext::new(Duration::from_secs(7200))
    }

    #[test]
    fn test_only_roots_eligible_initially() {
        let resolver = DependencyResolver::new();
        let eligible = resolver.eligible(&registry(), &context());
        assert_eq!(eligible, vec!["pattern_recognition"]);
    }

    #[test]
    fn test_fresh_success_unlocks_dependents() {
        let resolver = DependencyResolver::new();
        let mut ctx = context();
        ctx.last_success
            .insert("pattern_recognition".to_string(), Utc::now());

        let eligible = resolver.eligible(&registry(), &ctx);
        assert_eq!(eligible, vec!["pattern_recognition", "business_intelligence"]);
    }

    #[test]
    fn test_stale_success_does_not_satisfy_gating() {
        let resolver = DependencyResolver::new();
        let mut ctx = context();
        ctx.last_success.insert(
            "pattern_recognition".to_string(),
            Utc::now() - ChronoDuration::hours(3),
        );

        let eligible = resolver.eligible(&registry(), &ctx);
        assert_eq!(eligible, vec!["pattern_recognition"]);
    }

    #[test]
    fn test_force_bypasses_dependencies_not_running_invariant() {
        let resolver = DependencyResolver::new();
        let mut ctx = context();
        ctx.force = true;
        ctx.running.insert("ab_testing".to_string());

        let eligible = resolver.eligible(&registry(), &ctx);
        assert_eq!(
            eligible,
            vec!["pattern_recognition", "business_intelligence", "insights_engine"]
        );
    }

    #[test]
    fn test_execution_order_linear_chain() {
        let resolver = DependencyResolver::new();
        assert_eq!(
            resolver.execution_order(&registry()),
            vec![
                "pattern_recognition",
                "business_intelligence",
                "ab_testing",
                "insights_engine"
            ]
        );
    }

    #[test]
    fn test_execution_order_fan_out_ties_broken_by_declaration() {
        let resolver = DependencyResolver::new();
        let registry = AgentRegistry::from_descriptors(vec![
            descriptor("root", &[]),
            descriptor("left", &["root"]),
            descriptor("right", &["root"]),
            descriptor("join", &["left", "right"]),
        ])
        .unwrap();

        assert_eq!(
            resolver.execution_order(&registry),
            vec!["root", "left", "right", "join"]
        );
    }

    #[test]
    fn test_transitive_dependents() {
        let resolver = DependencyResolver::new();
        let dependents = resolver.transitive_dependents(&registry(), "pattern_recognition");
        assert_eq!(dependents.len(), 3);
        assert!(dependents.contains("business_intelligence"));
        assert!(dependents.contains("ab_testing"));
        assert!(dependents.contains("insights_engine"));

        let leaf = resolver.transitive_dependents(&registry(), "insights_engine");
        assert!(leaf.is_empty());
    }
}
