//! Task routing
//!
//! A validated, hot-swappable table maps each task type to its required
//! capability tags and coordination protocol. Routing reads a registry
//! snapshot at call time and is never cached: worker availability changes
//! continuously.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::capability::Capability;
use super::registry::WorkerRegistry;
use super::task::TaskPriority;
use super::{CoordinationError, CoordinationResult};

/// Topology used to combine worker invocations for one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinationProtocol {
    /// Workers invoked one at a time, each on the original payload
    Sequential,
    /// Workers invoked concurrently; partial failure tolerated
    Parallel,
    /// Each worker refines the previous worker's output
    Pipeline,
}

impl CoordinationProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinationProtocol::Sequential => "sequential",
            CoordinationProtocol::Parallel => "parallel",
            CoordinationProtocol::Pipeline => "pipeline",
        }
    }
}

impl std::str::FromStr for CoordinationProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sequential" => Ok(CoordinationProtocol::Sequential),
            "parallel" => Ok(CoordinationProtocol::Parallel),
            "pipeline" => Ok(CoordinationProtocol::Pipeline),
            _ => Err(format!("Invalid coordination protocol: {}", s)),
        }
    }
}

/// One routing table entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteSpec {
    pub capabilities: Vec<Capability>,
    pub protocol: CoordinationProtocol,
}

/// Task type -> route spec, validated as a whole at load time
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    routes: HashMap<String, RouteSpec>,
}

impl RoutingTable {
    /// Build a table from a parsed JSON document, failing closed on any
    /// malformed entry
    pub fn from_value(value: serde_json::Value) -> CoordinationResult<Self> {
        let raw: HashMap<String, RouteSpec> = serde_json::from_value(value)
            .map_err(|e| CoordinationError::InvalidRoutingConfig(e.to_string()))?;

        for (task_type, spec) in &raw {
            if task_type.trim().is_empty() {
                return Err(CoordinationError::InvalidRoutingConfig(
                    "task type cannot be empty".to_string(),
                ));
            }
            if spec.capabilities.is_empty() {
                return Err(CoordinationError::InvalidRoutingConfig(format!(
                    "task type {:?} has no required capabilities",
                    task_type
                )));
            }
            for cap in &spec.capabilities {
                cap.as_str()
                    .parse::<Capability>()
                    .map_err(|e| CoordinationError::InvalidRoutingConfig(e))?;
            }
        }

        Ok(Self { routes: raw })
    }

    pub fn from_json_str(json: &str) -> CoordinationResult<Self> {
        let value = serde_json::from_str(json)
            .map_err(|e| CoordinationError::InvalidRoutingConfig(e.to_string()))?;
        Self::from_value(value)
    }

    pub fn get(&self, task_type: &str) -> Option<&RouteSpec> {
        self.routes.get(task_type)
    }

    pub fn contains(&self, task_type: &str) -> bool {
        self.routes.contains_key(task_type)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

/// A routed assignment: ordered workers plus the protocol to run them under
#[derive(Debug, Clone)]
pub struct RoutePlan {
    pub workers: Vec<String>,
    pub protocol: CoordinationProtocol,
    pub required_capabilities: Vec<Capability>,
}

/// Routes tasks to workers using the table and a live registry snapshot
pub struct TaskRouter {
    registry: Arc<WorkerRegistry>,
    table: RwLock<RoutingTable>,
}

impl TaskRouter {
    pub fn new(registry: Arc<WorkerRegistry>, table: RoutingTable) -> Self {
        Self {
            registry,
            table: RwLock::new(table),
        }
    }

    /// Atomically replace the routing table
    pub async fn reload(&self, table: RoutingTable) -> usize {
        let mut current = self.table.write().await;
        *current = table;
        current.len()
    }

    pub async fn knows_type(&self, task_type: &str) -> bool {
        self.table.read().await.contains(task_type)
    }

    /// Produce the worker assignment for one task
    ///
    /// Every required capability must be satisfiable by at least one
    /// available worker. Parallel types assign every eligible worker;
    /// Sequential and Pipeline pick the best worker per capability, in
    /// capability order. A worker is never assigned twice.
    pub async fn route(
        &self,
        task_type: &str,
        priority: TaskPriority,
    ) -> CoordinationResult<RoutePlan> {
        let spec = {
            let table = self.table.read().await;
            table
                .get(task_type)
                .cloned()
                .ok_or_else(|| CoordinationError::UnknownTaskType(task_type.to_string()))?
        };

        let mut workers: Vec<String> = Vec::new();
        for cap in &spec.capabilities {
            let eligible = self
                .registry
                .eligible_for(cap, &spec.capabilities, priority)
                .await;
            if eligible.is_empty() {
                if self.registry.capable_exists(cap).await {
                    return Err(CoordinationError::WorkerAtCapacity(format!(
                        "all workers with capability {:?} are at capacity",
                        cap.as_str()
                    )));
                }
                return Err(CoordinationError::NoEligibleWorkers(format!(
                    "no available worker with capability {:?} for task type {:?}",
                    cap.as_str(),
                    task_type
                )));
            }

            match spec.protocol {
                CoordinationProtocol::Parallel => {
                    for id in eligible {
                        if !workers.contains(&id) {
                            workers.push(id);
                        }
                    }
                }
                CoordinationProtocol::Sequential | CoordinationProtocol::Pipeline => {
                    let best = self
                        .registry
                        .select_best(&eligible, &spec.capabilities, priority)
                        .await
                        .ok_or_else(|| {
                            CoordinationError::NoEligibleWorkers(format!(
                                "no available worker with capability {:?} for task type {:?}",
                                cap.as_str(),
                                task_type
                            ))
                        })?;
                    if !workers.contains(&best) {
                        workers.push(best);
                    }
                }
            }
        }

        Ok(RoutePlan {
            workers,
            protocol: spec.protocol,
            required_capabilities: spec.capabilities,
        })
    }
}
