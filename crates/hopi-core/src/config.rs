//! Configuration types for hopi.
//!
//! [`Config::load`] reads `~/.config/hopi/config.toml`, creating it with
//! hardcoded defaults if it does not yet exist. [`Config::from_file`] layers
//! an explicit file over the defaults. [`Config::defaults`] returns the
//! defaults without touching the filesystem (useful in tests).

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::types::{BackPropagation, EvaluationType, NodeSelection};

// ---------------------------------------------------------------------------
// Embedded defaults
// ---------------------------------------------------------------------------

const DEFAULT_CONFIG: &str = r#"
[inference]
epsilon  = 0.01
max_iter = 100

[mcts]
planning_steps       = 150
exploration_constant = 2.4
pref_precision       = 1.0
action_precision     = 1.0
evaluation           = "efe"

[algo_tree]
planning_steps   = 100
node_selection   = "softmax_sampling"
evaluation       = "double_kl"
back_propagation = "upward"
# max_tree_depth = 5

[agent]
seed      = 42
max_steps = 20
"#;

// ---------------------------------------------------------------------------
// Public config types
// ---------------------------------------------------------------------------

/// Top-level configuration, loaded from `~/.config/hopi/config.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub inference: InferenceConfig,
    #[serde(default)]
    pub mcts: MctsSettings,
    #[serde(default)]
    pub algo_tree: AlgoTreeSettings,
    #[serde(default)]
    pub agent: AgentSettings,
}

/// `[inference]` section: variational message passing.
#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_max_iter")]
    pub max_iter: usize,
}

fn default_epsilon() -> f64 { 0.01 }
fn default_max_iter() -> usize { 100 }

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            epsilon: default_epsilon(),
            max_iter: default_max_iter(),
        }
    }
}

/// `[mcts]` section. Preferences come from the environment at run time.
#[derive(Debug, Clone, Deserialize)]
pub struct MctsSettings {
    #[serde(default = "default_mcts_planning_steps")]
    pub planning_steps: usize,
    #[serde(default = "default_exploration_constant")]
    pub exploration_constant: f64,
    #[serde(default = "default_precision")]
    pub pref_precision: f64,
    #[serde(default = "default_precision")]
    pub action_precision: f64,
    #[serde(default = "default_mcts_evaluation")]
    pub evaluation: EvaluationType,
}

fn default_mcts_planning_steps() -> usize { 150 }
fn default_exploration_constant() -> f64 { 2.4 }
fn default_precision() -> f64 { 1.0 }
fn default_mcts_evaluation() -> EvaluationType { EvaluationType::Efe }

impl Default for MctsSettings {
    fn default() -> Self {
        Self {
            planning_steps: default_mcts_planning_steps(),
            exploration_constant: default_exploration_constant(),
            pref_precision: default_precision(),
            action_precision: default_precision(),
            evaluation: default_mcts_evaluation(),
        }
    }
}

/// `[algo_tree]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AlgoTreeSettings {
    #[serde(default = "default_tree_planning_steps")]
    pub planning_steps: usize,
    /// Unlimited when absent.
    #[serde(default)]
    pub max_tree_depth: Option<usize>,
    #[serde(default = "default_node_selection")]
    pub node_selection: NodeSelection,
    #[serde(default = "default_tree_evaluation")]
    pub evaluation: EvaluationType,
    #[serde(default = "default_back_propagation")]
    pub back_propagation: BackPropagation,
}

fn default_tree_planning_steps() -> usize { 100 }
fn default_node_selection() -> NodeSelection { NodeSelection::SoftmaxSampling }
fn default_tree_evaluation() -> EvaluationType { EvaluationType::DoubleKl }
fn default_back_propagation() -> BackPropagation { BackPropagation::Upward }

impl Default for AlgoTreeSettings {
    fn default() -> Self {
        Self {
            planning_steps: default_tree_planning_steps(),
            max_tree_depth: None,
            node_selection: default_node_selection(),
            evaluation: default_tree_evaluation(),
            back_propagation: default_back_propagation(),
        }
    }
}

/// `[agent]` section: episode-level settings.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSettings {
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_seed() -> u64 { 42 }
fn default_max_steps() -> usize { 20 }

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            max_steps: default_max_steps(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::defaults()
    }
}

impl Config {
    /// Load from `~/.config/hopi/config.toml`, layered on top of the built-in
    /// defaults. Creates the file with defaults if it does not exist.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path();

        if !path.exists() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, DEFAULT_CONFIG.trim_start())?;
        }

        Self::from_file(&path)
    }

    /// Layer `path` over the built-in defaults. A missing file is an error.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::from(path).required(true))
            .build()?
            .try_deserialize()
            .map_err(Into::into)
    }

    /// Return the built-in defaults without touching the filesystem.
    pub fn defaults() -> Self {
        config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()
            .expect("built-in default config must be valid TOML")
            .try_deserialize()
            .expect("built-in default config must deserialize correctly")
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".to_string()))
                .join(".config")
        })
        .join("hopi")
        .join("config.toml")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
