use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use psyche_core::config::AgentsConfig;
use psyche_core::error::{PsycheError, Result};
use psyche_core::traits::Agent;
use psyche_core::types::AgentCapability;
use psyche_workflow::graph::{AgentFactory, ChainBuilder};

use crate::builtin::big_five::BigFiveAgent;
use crate::builtin::enneagram::EnneagramAgent;
use crate::builtin::ifs_parts::IfsPartsAgent;
use crate::builtin::report::ReportAgent;
use crate::builtin::text_features::TextFeatureAgent;
use crate::builtin::translation::TranslationAgent;
use crate::builtin::values::ValuesAgent;
use crate::builtin::{config_f64, NodeConfig};

struct Entry {
    description: String,
    factory: AgentFactory,
}

/// Agent classes available to chain files, keyed by `agent_class`.
pub struct AgentCatalog {
    entries: BTreeMap<String, Entry>,
}

impl AgentCatalog {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Register a class. Re-registering a class replaces its factory.
    pub fn register<F>(&mut self, class: impl Into<String>, description: impl Into<String>, factory: F)
    where
        F: Fn(&str, &NodeConfig) -> Result<Arc<dyn Agent>> + Send + Sync + 'static,
    {
        let class = class.into();
        debug!(agent_class = %class, "Agent class added to catalog");
        self.entries.insert(
            class,
            Entry {
                description: description.into(),
                factory: Arc::new(factory),
            },
        );
    }

    /// Create a catalog with all built-in agents registered.
    pub fn with_builtins() -> Self {
        Self::with_config(&AgentsConfig::default())
    }

    /// Built-in agents, parameterized by the `[agents]` config section.
    pub fn with_config(config: &AgentsConfig) -> Self {
        let mut catalog = Self::new();

        // ── Preprocessing ───────────────────────────────────────
        let target = config.default_target_language.clone();
        catalog.register(
            "translation",
            "Detect the input language and translate to the target language.",
            move |id, cfg| Ok(Arc::new(TranslationAgent::from_config(id, &target, cfg)?) as Arc<dyn Agent>),
        );
        let dims = config.embedding_dims;
        catalog.register(
            "text_features",
            "Sentiment, emotions, hashed embedding and basic text statistics.",
            move |id, cfg| Ok(Arc::new(TextFeatureAgent::from_config(id, dims, cfg)?) as Arc<dyn Agent>),
        );

        // ── Frameworks ──────────────────────────────────────────
        let min = config.min_confidence;
        catalog.register(
            "enneagram",
            "Enneagram primary type and wing.",
            move |id, cfg| Ok(Arc::new(EnneagramAgent::new(id, min_confidence(id, cfg, min)?)) as Arc<dyn Agent>),
        );
        catalog.register(
            "big_five",
            "Big Five (OCEAN) trait scores.",
            move |id, cfg| Ok(Arc::new(BigFiveAgent::new(id, min_confidence(id, cfg, min)?)) as Arc<dyn Agent>),
        );
        catalog.register(
            "values",
            "Schwartz basic values and the top-ranked ones.",
            move |id, cfg| {
                Ok(Arc::new(ValuesAgent::from_config(id, min_confidence(id, cfg, min)?, cfg)?) as Arc<dyn Agent>)
            },
        );
        catalog.register(
            "ifs_parts",
            "Internal Family Systems parts and a safety level.",
            move |id, cfg| Ok(Arc::new(IfsPartsAgent::new(id, min_confidence(id, cfg, min)?)) as Arc<dyn Agent>),
        );

        // ── Aggregation ─────────────────────────────────────────
        catalog.register(
            "report",
            "Summarize the results mapped into it.",
            |id, _cfg| Ok(Arc::new(ReportAgent::new(id)) as Arc<dyn Agent>),
        );

        catalog
    }

    /// Registered class names, sorted.
    pub fn classes(&self) -> Vec<&str> {
        self.entries.keys().map(|s| s.as_str()).collect()
    }

    pub fn description(&self, class: &str) -> Option<&str> {
        self.entries.get(class).map(|e| e.description.as_str())
    }

    /// Instantiate `class` for a node.
    pub fn build(&self, class: &str, agent_id: &str, config: &NodeConfig) -> Result<Arc<dyn Agent>> {
        let entry = self
            .entries
            .get(class)
            .ok_or_else(|| PsycheError::AgentClassNotRegistered(class.to_string()))?;
        (entry.factory)(agent_id, config)
    }

    /// Capabilities advertised by a default-configured instance of `class`.
    pub fn capabilities(&self, class: &str) -> Result<Vec<AgentCapability>> {
        Ok(self.build(class, class, &NodeConfig::new())?.capabilities())
    }

    /// Make every class available to chains built by `builder`.
    pub fn register_into(&self, builder: &mut ChainBuilder) {
        for (class, entry) in &self.entries {
            let factory = entry.factory.clone();
            builder.register_agent(class.clone(), move |id: &str, cfg: &NodeConfig| factory(id, cfg));
        }
    }
}

impl Default for AgentCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn min_confidence(agent_id: &str, config: &NodeConfig, default: f64) -> Result<f64> {
    Ok(config_f64(agent_id, config, "min_confidence")?.unwrap_or(default))
}
