//! The agent-kind registry — tag to constructor, config to tree.
//!
//! `AgentKind` is a closed enum, so an unknown tag already dies at
//! configuration parse; the registry adds the other construction-time
//! guarantees: a kind tag registered twice is an error, a kind with no
//! registered constructor is an error naming the tag, and duplicate
//! agent ids, dangling references, and reference cycles all refuse to
//! build. New kinds plug in as `NodeBuilder` implementations without a
//! central switch statement growing.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{debug, info};

use agentmesh_config::{AgentConfig, AgentKind, AppConfig};
use agentmesh_core::error::{ConfigError, Error, Result};
use agentmesh_core::node::AgentNode;
use agentmesh_remote::ProxyNode;

use crate::llm::LlmNode;
use crate::sequential::SequentialNode;

/// Constructs one node kind from its config and pre-built children.
#[async_trait]
pub trait NodeBuilder: Send + Sync {
    async fn build(
        &self,
        config: &AgentConfig,
        sub_agents: Vec<Arc<dyn AgentNode>>,
        app: &AppConfig,
    ) -> Result<Arc<dyn AgentNode>>;
}

struct LlmBuilder;

#[async_trait]
impl NodeBuilder for LlmBuilder {
    async fn build(
        &self,
        config: &AgentConfig,
        sub_agents: Vec<Arc<dyn AgentNode>>,
        app: &AppConfig,
    ) -> Result<Arc<dyn AgentNode>> {
        Ok(Arc::new(LlmNode::from_config(config, sub_agents, app).await?))
    }
}

struct SequentialBuilder;

#[async_trait]
impl NodeBuilder for SequentialBuilder {
    async fn build(
        &self,
        config: &AgentConfig,
        sub_agents: Vec<Arc<dyn AgentNode>>,
        _app: &AppConfig,
    ) -> Result<Arc<dyn AgentNode>> {
        Ok(Arc::new(SequentialNode::new(config.agent_id(), sub_agents)))
    }
}

/// Maps kind tags to constructors and builds composition trees.
pub struct Registry {
    builders: HashMap<AgentKind, Arc<dyn NodeBuilder>>,
}

impl Registry {
    /// An empty registry with no kinds.
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// A registry with the built-in kinds installed.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register(AgentKind::Llm, Arc::new(LlmBuilder))
            .expect("builtin llm kind registered once");
        registry
            .register(AgentKind::Sequential, Arc::new(SequentialBuilder))
            .expect("builtin sequential kind registered once");
        registry
    }

    /// Associate a kind tag with a constructor.
    ///
    /// Registering a tag twice is a programming error and fails at
    /// construction, never at request time.
    pub fn register(&mut self, kind: AgentKind, builder: Arc<dyn NodeBuilder>) -> Result<()> {
        if self.builders.contains_key(&kind) {
            return Err(ConfigError::DuplicateKind(kind.to_string()).into());
        }
        self.builders.insert(kind, builder);
        Ok(())
    }

    /// Build the composition tree for a declared agent set. The first
    /// config is the pipeline root; id references resolve within the
    /// set, URL references become proxy nodes.
    pub async fn build_pipeline(
        &self,
        configs: &[AgentConfig],
        app: &AppConfig,
    ) -> Result<Arc<dyn AgentNode>> {
        let root = configs
            .first()
            .ok_or_else(|| Error::Config(ConfigError::Parse("no agents declared".into())))?;

        let mut by_id: HashMap<String, &AgentConfig> = HashMap::new();
        for config in configs {
            let id = config.agent_id();
            if by_id.insert(id.clone(), config).is_some() {
                return Err(ConfigError::DuplicateAgentId(id).into());
            }
        }

        let node = self.build_node(root, &by_id, app, Vec::new()).await?;
        info!(root = node.name(), agents = configs.len(), "Pipeline built");
        Ok(node)
    }

    /// Build a single agent config with no siblings to reference.
    pub async fn build(&self, config: &AgentConfig, app: &AppConfig) -> Result<Arc<dyn AgentNode>> {
        let by_id = HashMap::from([(config.agent_id(), config)]);
        self.build_node(config, &by_id, app, Vec::new()).await
    }

    fn build_node<'a>(
        &'a self,
        config: &'a AgentConfig,
        by_id: &'a HashMap<String, &'a AgentConfig>,
        app: &'a AppConfig,
        path: Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<dyn AgentNode>>> {
        Box::pin(async move {
            let id = config.agent_id();
            if path.contains(&id) {
                return Err(ConfigError::CyclicAgentRef { agent: id }.into());
            }

            let mut sub_agents: Vec<Arc<dyn AgentNode>> = Vec::new();
            for reference in &config.sub_agent_refs {
                if reference.starts_with("http://") || reference.starts_with("https://") {
                    sub_agents.push(Arc::new(ProxyNode::new(reference)));
                } else {
                    let child = by_id.get(reference).ok_or_else(|| {
                        Error::Config(ConfigError::UnknownAgentRef {
                            agent: id.clone(),
                            reference: reference.clone(),
                        })
                    })?;
                    let mut child_path = path.clone();
                    child_path.push(id.clone());
                    sub_agents.push(self.build_node(child, by_id, app, child_path).await?);
                }
            }

            let builder = self
                .builders
                .get(&config.kind)
                .ok_or_else(|| Error::Config(ConfigError::UnknownKind(config.kind.to_string())))?;

            debug!(agent = %id, kind = %config.kind, children = sub_agents.len(), "Building agent");
            builder.build(config, sub_agents, app).await
        })
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmesh_config::ModelField;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn llm_config(name: &str) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            model: Some(ModelField::Name("ai/qwen3".into())),
            ..Default::default()
        }
    }

    fn sequential_config(name: &str, refs: &[&str]) -> AgentConfig {
        AgentConfig {
            name: name.into(),
            kind: AgentKind::Sequential,
            sub_agent_refs: refs.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = Registry::with_builtins();
        let err = registry
            .register(AgentKind::Llm, Arc::new(LlmBuilder))
            .unwrap_err();
        assert!(err.to_string().contains("already registered"));
    }

    #[tokio::test]
    async fn unregistered_kind_fails_naming_the_tag() {
        let registry = Registry::new();
        let err = registry
            .build(&llm_config("writer"), &AppConfig::default())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("Unknown agent kind"));
        assert!(err.to_string().contains("llm"));
    }

    #[tokio::test]
    async fn duplicate_agent_ids_fail() {
        let registry = Registry::with_builtins();
        let configs = vec![llm_config("writer"), llm_config("writer")];
        let err = registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::DuplicateAgentId(_))
        ));
    }

    #[tokio::test]
    async fn unknown_reference_fails() {
        let registry = Registry::with_builtins();
        let configs = vec![sequential_config("pipeline", &["ghost"])];
        let err = registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::UnknownAgentRef { .. })
        ));
    }

    #[tokio::test]
    async fn reference_cycle_fails() {
        let registry = Registry::with_builtins();
        let configs = vec![
            sequential_config("a", &["b"]),
            sequential_config("b", &["a"]),
        ];
        let err = registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::CyclicAgentRef { .. })
        ));
    }

    #[tokio::test]
    async fn llm_without_model_fails_at_construction() {
        let registry = Registry::with_builtins();
        let configs = vec![AgentConfig {
            name: "writer".into(),
            ..Default::default()
        }];
        let err = registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, Error::Config(ConfigError::MissingModel(_))));
    }

    #[tokio::test]
    async fn builtin_pipeline_builds() {
        let registry = Registry::with_builtins();
        let configs = vec![
            sequential_config("Review Pipeline", &["http://critic:9001", "writer"]),
            llm_config("writer"),
        ];
        let root = registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .unwrap();
        assert_eq!(root.name(), "Review_Pipeline");
    }

    /// Counts constructions and the children handed to each.
    struct CountingBuilder {
        built: Arc<AtomicUsize>,
        children_seen: Arc<Mutex<Vec<(String, usize)>>>,
    }

    #[async_trait]
    impl NodeBuilder for CountingBuilder {
        async fn build(
            &self,
            config: &AgentConfig,
            sub_agents: Vec<Arc<dyn AgentNode>>,
            _app: &AppConfig,
        ) -> Result<Arc<dyn AgentNode>> {
            self.built.fetch_add(1, Ordering::SeqCst);
            self.children_seen
                .lock()
                .unwrap()
                .push((config.agent_id(), sub_agents.len()));
            Ok(Arc::new(SequentialNode::new(config.agent_id(), sub_agents)))
        }
    }

    #[tokio::test]
    async fn node_count_is_declared_agents_plus_remote_refs() {
        let built = Arc::new(AtomicUsize::new(0));
        let children_seen = Arc::new(Mutex::new(Vec::new()));

        let mut registry = Registry::new();
        for kind in [AgentKind::Llm, AgentKind::Sequential] {
            registry
                .register(
                    kind,
                    Arc::new(CountingBuilder {
                        built: built.clone(),
                        children_seen: children_seen.clone(),
                    }),
                )
                .unwrap();
        }

        let configs = vec![
            sequential_config(
                "root",
                &["http://a:9001", "http://b:9002", "writer"],
            ),
            llm_config("writer"),
        ];
        registry
            .build_pipeline(&configs, &AppConfig::default())
            .await
            .unwrap();

        // Two declared agents constructed...
        assert_eq!(built.load(Ordering::SeqCst), 2);
        let seen = children_seen.lock().unwrap();
        // ...children built depth-first: writer (leaf), then root with
        // two proxies + writer. Total nodes: 2 declared + 2 remote refs.
        assert_eq!(*seen, vec![("writer".to_string(), 0), ("root".to_string(), 3)]);
    }
}
