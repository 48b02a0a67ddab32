//! Apply waves
//!
//! The provisioning engine applies resources with maximum safe parallelism:
//! wave *n* holds every resource whose dependencies all sit in earlier
//! waves. Components have no cloud counterpart and are left out.
//!
//! ```text
//! Execution Plan: 5 resources in 3 waves
//!   Wave 0: 1 resources
//!     - demo-vpc-vpc (aws:ec2/vpc:Vpc)
//!   Wave 1: 2 resources
//!     ...
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use stratus_core::{RenderedResource, RenderedStack, ResourceMode};

use crate::error::{EngineError, Result};

/// A planned resource operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedResource {
    pub name: String,
    pub type_token: String,
    pub mode: ResourceMode,
}

impl PlannedResource {
    /// Display key, e.g. `demo-vpc-vpc (aws:ec2/vpc:Vpc)`
    pub fn key(&self) -> String {
        match self.mode {
            ResourceMode::Lookup => format!("{} ({}, lookup)", self.name, self.type_token),
            _ => format!("{} ({})", self.name, self.type_token),
        }
    }
}

/// A wave of resources to apply together
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wave {
    /// Wave number
    pub number: usize,
    pub resources: Vec<PlannedResource>,
}

impl Wave {
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Get all resource names in this wave
    pub fn resource_names(&self) -> Vec<&str> {
        self.resources.iter().map(|r| r.name.as_str()).collect()
    }
}

/// Execution plan for a stack
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub waves: Vec<Wave>,
}

impl ExecutionPlan {
    /// Group the resources of a rendered stack into waves
    pub fn from_rendered(stack: &RenderedStack) -> Result<Self> {
        let nodes: IndexMap<&str, &RenderedResource> = stack
            .resources
            .iter()
            .filter(|r| r.mode != ResourceMode::Component)
            .map(|r| (r.name.as_str(), r))
            .collect();

        // Edges to components carry no ordering
        let deps: IndexMap<&str, Vec<&str>> = nodes
            .iter()
            .map(|(name, r)| {
                let d = r
                    .depends_on
                    .iter()
                    .map(String::as_str)
                    .filter(|d| nodes.contains_key(d))
                    .collect();
                (*name, d)
            })
            .collect();

        let mut placed: HashSet<&str> = HashSet::new();
        let mut waves = Vec::new();

        while placed.len() < nodes.len() {
            let ready: Vec<&str> = deps
                .iter()
                .filter(|(name, _)| !placed.contains(*name))
                .filter(|(_, d)| d.iter().all(|dep| placed.contains(dep)))
                .map(|(name, _)| *name)
                .collect();

            if ready.is_empty() {
                let remaining: Vec<&str> = deps
                    .keys()
                    .copied()
                    .filter(|n| !placed.contains(n))
                    .collect();
                return Err(EngineError::ResourceCycle {
                    path: find_cycle(&deps, &remaining),
                });
            }

            let resources = ready
                .iter()
                .map(|name| {
                    let r = nodes[name];
                    PlannedResource {
                        name: r.name.clone(),
                        type_token: r.type_token.clone(),
                        mode: r.mode,
                    }
                })
                .collect();
            placed.extend(ready);
            waves.push(Wave {
                number: waves.len(),
                resources,
            });
        }

        Ok(Self { waves })
    }

    /// Get all resources in order
    pub fn all_resources(&self) -> Vec<&PlannedResource> {
        self.waves.iter().flat_map(|w| w.resources.iter()).collect()
    }

    /// Wave a resource is applied in
    pub fn wave_of(&self, name: &str) -> Option<usize> {
        self.waves
            .iter()
            .find(|w| w.resources.iter().any(|r| r.name == name))
            .map(|w| w.number)
    }

    pub fn wave_count(&self) -> usize {
        self.waves.len()
    }

    pub fn resource_count(&self) -> usize {
        self.waves.iter().map(|w| w.resources.len()).sum()
    }

    /// Generate a summary of the execution plan
    pub fn summary(&self) -> ExecutionPlanSummary {
        let waves = self
            .waves
            .iter()
            .map(|w| WaveSummary {
                number: w.number,
                resource_count: w.resources.len(),
                resources: w.resources.iter().map(|r| r.key()).collect(),
            })
            .collect();

        ExecutionPlanSummary {
            waves,
            total_resources: self.resource_count(),
            total_waves: self.wave_count(),
        }
    }
}

/// Walk the stuck resources until one repeats
fn find_cycle(deps: &IndexMap<&str, Vec<&str>>, remaining: &[&str]) -> Vec<String> {
    let Some(start) = remaining.first() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = vec![*start];
    let mut current = *start;
    loop {
        // Every stuck resource has at least one stuck dependency
        let next = deps
            .get(current)
            .and_then(|d| d.iter().copied().find(|dep| remaining.contains(dep)));
        let Some(next) = next else {
            return path.into_iter().map(String::from).collect();
        };
        if let Some(pos) = path.iter().position(|p| *p == next) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(next.to_string());
            return cycle;
        }
        path.push(next);
        current = next;
    }
}

/// Summary of an execution plan for display
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionPlanSummary {
    pub waves: Vec<WaveSummary>,
    pub total_resources: usize,
    pub total_waves: usize,
}

impl ExecutionPlanSummary {
    /// Format as a human-readable string
    pub fn display(&self) -> String {
        let mut lines = vec![format!(
            "Execution Plan: {} resources in {} waves",
            self.total_resources, self.total_waves
        )];

        for wave in &self.waves {
            lines.push(format!(
                "  Wave {}: {} resources",
                wave.number, wave.resource_count
            ));
            for resource in &wave.resources {
                lines.push(format!("    - {}", resource));
            }
        }

        lines.join("\n")
    }
}

/// Summary of a single wave
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaveSummary {
    pub number: usize,
    pub resource_count: usize,
    pub resources: Vec<String>,
}
