//! Stack evaluation

use stratus_core::{RenderedStack, StackConfig};
use tracing::{debug, info};

use crate::context::StackContext;
use crate::error::{EngineError, Result};
use crate::graph::ResourceGraph;
use crate::plan::ExecutionPlan;
use crate::stacks;

/// Engine builder
pub struct EngineBuilder {
    strict_exports: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            strict_exports: true,
        }
    }

    /// Fail when a stack does not export every output downstream stacks read
    pub fn strict_exports(mut self, strict: bool) -> Self {
        self.strict_exports = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_exports)
    }
}

/// Evaluates stack programs into validated resource graphs
pub struct Engine {
    strict_exports: bool,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Engine {
    pub fn new(strict_exports: bool) -> Self {
        Self { strict_exports }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Evaluate the stack and validate the resulting graph
    pub fn evaluate(&self, ctx: &StackContext, config: &StackConfig) -> Result<ResourceGraph> {
        let expected = ctx.stack().kind;
        if config.kind() != expected {
            return Err(EngineError::ConfigMismatch {
                expected,
                found: config.kind(),
            });
        }

        let issues = config.validate();
        if !issues.is_empty() {
            return Err(stratus_core::CoreError::InvalidConfig {
                stack: expected.project().to_string(),
                issues,
            }
            .into());
        }

        let graph = stacks::evaluate(ctx, config)?;
        graph.validate()?;
        if self.strict_exports {
            self.check_exports(&graph)?;
        }

        info!(stack = %ctx.stack(), resources = graph.len(), outputs = graph.outputs().len(), "stack evaluated");
        Ok(graph)
    }

    /// Evaluate and render the document for the provisioning engine
    pub fn render(&self, ctx: &StackContext, config: &StackConfig) -> Result<RenderedStack> {
        self.evaluate(ctx, config)?.render()
    }

    /// Evaluate and compute apply waves
    pub fn plan(&self, ctx: &StackContext, config: &StackConfig) -> Result<ExecutionPlan> {
        self.evaluate(ctx, config)?.plan()
    }

    fn check_exports(&self, graph: &ResourceGraph) -> Result<()> {
        let stack = graph.stack();
        for key in stack.kind.required_outputs() {
            if !graph.outputs().contains_key(*key) {
                return Err(EngineError::MissingExport {
                    stack: stack.name(),
                    key: key.to_string(),
                });
            }
            debug!(stack = %stack, output = *key, "export present");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stacks::fixtures;
    use stratus_core::{ResourceMode, StackKind, Values};

    fn config(kind: StackKind) -> StackConfig {
        let values = Values::from_yaml(fixtures::config_source(kind)).unwrap();
        StackConfig::from_values(kind, &values).unwrap()
    }

    #[test]
    fn test_render_every_stack() {
        let engine = Engine::default();
        for kind in StackKind::ALL {
            let rendered = engine.render(&fixtures::context(kind), &config(kind)).unwrap();
            assert_eq!(rendered.stack.kind, kind);
            for key in kind.required_outputs() {
                assert!(rendered.outputs.contains_key(*key), "{kind} misses {key}");
            }
            assert!(rendered.managed_count() > 0);
        }
    }

    #[test]
    fn test_config_mismatch() {
        let engine = Engine::default();
        let err = engine
            .render(&fixtures::context(StackKind::App), &config(StackKind::Network))
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::ConfigMismatch {
                expected: StackKind::App,
                found: StackKind::Network
            }
        ));
        assert!(err.is_config_error());
    }

    #[test]
    fn test_invalid_config_rejected_before_graph() {
        let StackConfig::App(mut app) = config(StackKind::App) else {
            panic!("expected app config");
        };
        app.app_min_replicas = 7;
        app.app_max_replicas = 6;

        let err = Engine::default()
            .render(&fixtures::context(StackKind::App), &StackConfig::App(app))
            .unwrap_err();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("app_min_replicas"));
    }

    #[test]
    fn test_equal_replicas_allowed() {
        let StackConfig::App(mut app) = config(StackKind::App) else {
            panic!("expected app config");
        };
        app.app_min_replicas = 3;
        app.app_max_replicas = 3;
        assert!(Engine::default()
            .render(&fixtures::context(StackKind::App), &StackConfig::App(app))
            .is_ok());
    }

    #[test]
    fn test_plan_waves() {
        let plan = Engine::default()
            .plan(&fixtures::context(StackKind::Network), &config(StackKind::Network))
            .unwrap();
        let vpc = plan.wave_of("demo-vpc-vpc").unwrap();
        let subnet = plan.wave_of("demo-vpc-public-0").unwrap();
        let nat = plan.wave_of("demo-vpc-nat-0").unwrap();
        assert!(vpc < subnet);
        assert!(subnet < nat);
    }

    #[test]
    fn test_lookups_rendered_as_lookups() {
        let rendered = Engine::default()
            .render(&fixtures::context(StackKind::Database), &config(StackKind::Database))
            .unwrap();
        let zone = rendered.resource("demo-db-zone").unwrap();
        assert_eq!(zone.mode, ResourceMode::Lookup);
    }
}
