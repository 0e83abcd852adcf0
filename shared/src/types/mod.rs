//! Core types used throughout the orchestration system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// Global process ID singleton - set once at startup
static PROCESS_ID: OnceLock<ProcessId> = OnceLock::new();

/// Fallback identity used before any `init_*` call
static DEFAULT_PROCESS_ID: ProcessId = ProcessId::Orchestrator;

/// Process identifier for any component in the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProcessId {
    /// Orchestrator process (singleton)
    Orchestrator,
    /// Worker pool serving a single domain
    Worker(Domain),
}

impl ProcessId {
    /// Initialize the global process ID for orchestrator
    pub fn init_orchestrator() -> &'static ProcessId {
        PROCESS_ID.get_or_init(|| ProcessId::Orchestrator)
    }

    /// Get the global process ID, falling back to the orchestrator identity
    pub fn current() -> &'static ProcessId {
        PROCESS_ID.get().unwrap_or(&DEFAULT_PROCESS_ID)
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Orchestrator => write!(f, "orchestrator"),
            ProcessId::Worker(domain) => write!(f, "worker_{domain}"),
        }
    }
}

/// Specialty areas served by worker pools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Development,
    Quality,
    Security,
    Research,
    Infrastructure,
    Coordination,
}

impl Domain {
    /// Every domain, in canonical order
    pub const ALL: [Domain; 6] = [
        Domain::Development,
        Domain::Quality,
        Domain::Security,
        Domain::Research,
        Domain::Infrastructure,
        Domain::Coordination,
    ];

    /// Fixed capability table for the domain
    pub fn capabilities(&self) -> &'static [&'static str] {
        match self {
            Domain::Development => &["coding", "implementation", "refactoring", "debugging", "api"],
            Domain::Quality => &["testing", "qa", "coverage", "linting", "review"],
            Domain::Security => &["security", "audit", "compliance", "vulnerability-scan", "crypto"],
            Domain::Research => &["research", "analysis", "documentation", "patterns"],
            Domain::Infrastructure => &["deployment", "infrastructure", "configuration", "ci-cd", "monitoring"],
            Domain::Coordination => &["coordination", "planning", "scheduling", "integration"],
        }
    }

    /// Keywords that route free-form task text towards this domain
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Domain::Development => &["implement", "code", "build", "feature", "refactor", "fix", "develop"],
            Domain::Quality => &["test", "qa", "quality", "coverage", "lint", "verify"],
            Domain::Security => &["security", "auth", "vulnerab", "audit", "crypto", "secret"],
            Domain::Research => &["research", "investigate", "analyze", "document", "explore"],
            Domain::Infrastructure => &["deploy", "infra", "config", "pipeline", "docker", "kubernetes", "ci"],
            Domain::Coordination => &["coordinate", "plan", "schedule", "orchestrate", "integrate"],
        }
    }

    /// Whether the domain advertises the given capability
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities()
            .iter()
            .any(|c| c.eq_ignore_ascii_case(capability))
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Domain::Development => write!(f, "development"),
            Domain::Quality => write!(f, "quality"),
            Domain::Security => write!(f, "security"),
            Domain::Research => write!(f, "research"),
            Domain::Infrastructure => write!(f, "infrastructure"),
            Domain::Coordination => write!(f, "coordination"),
        }
    }
}

impl std::str::FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Domain::Development),
            "quality" | "qa" => Ok(Domain::Quality),
            "security" => Ok(Domain::Security),
            "research" => Ok(Domain::Research),
            "infrastructure" | "infra" => Ok(Domain::Infrastructure),
            "coordination" => Ok(Domain::Coordination),
            _ => Err(format!("Unknown domain: {s}")),
        }
    }
}

/// Task priority, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Priority {
    /// Weight contributed to the complexity score
    pub fn weight(&self) -> f64 {
        match self {
            Priority::Low => 5.0,
            Priority::Medium => 10.0,
            Priority::High => 20.0,
            Priority::Critical => 40.0,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Medium => write!(f, "medium"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

/// Typed task metadata with a small extension map for unstructured fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub created_at: DateTime<Utc>,
    pub submitted_by: Option<String>,
    /// Set on shard subtasks only
    pub parent_task_id: Option<String>,
    pub tags: Vec<String>,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

impl Default for TaskMetadata {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            submitted_by: None,
            parent_task_id: None,
            tags: Vec::new(),
            extensions: HashMap::new(),
        }
    }
}

/// Unit of work submitted to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    /// Hint / default target domain
    pub domain: Domain,
    pub priority: Priority,
    /// Ordered resource identifiers
    pub files: Vec<String>,
    /// External resource names
    pub dependencies: BTreeSet<String>,
    /// Estimated amount of work, e.g. lines touched
    pub estimated_size: u64,
    pub required_capabilities: BTreeSet<String>,
    pub metadata: TaskMetadata,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>, domain: Domain) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            domain,
            priority: Priority::default(),
            files: Vec::new(),
            dependencies: BTreeSet::new(),
            estimated_size: 0,
            required_capabilities: BTreeSet::new(),
            metadata: TaskMetadata::default(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_estimated_size(mut self, size: u64) -> Self {
        self.estimated_size = size;
        self
    }

    pub fn with_capabilities<I, S>(mut self, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_capabilities = capabilities.into_iter().map(Into::into).collect();
        self
    }

    /// Derived copy restricted to a subset of files
    pub fn restricted_to(&self, id: impl Into<String>, files: Vec<String>, domain: Domain) -> Self {
        let mut metadata = self.metadata.clone();
        metadata.parent_task_id = Some(self.id.clone());
        Self {
            id: id.into(),
            description: self.description.clone(),
            domain,
            priority: self.priority,
            files,
            dependencies: self.dependencies.clone(),
            estimated_size: 0,
            required_capabilities: self.required_capabilities.clone(),
            metadata,
        }
    }
}

/// A bounded, resource-disjoint slice of an oversized task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskShard {
    pub original_task_id: String,
    pub shard_id: String,
    pub shard_index: usize,
    pub total_shards: usize,
    pub assigned_domain: Domain,
    pub subtask: Task,
    /// Shards that must complete before this one, in order
    pub depends_on_shard_ids: Vec<String>,
}

impl TaskShard {
    pub fn shard_id_for(original_task_id: &str, index: usize) -> String {
        format!("{original_task_id}-shard-{index}")
    }
}

/// Metadata reported alongside a task result
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultMetadata {
    pub domain: Option<Domain>,
    pub duration_ms: u64,
    #[serde(default)]
    pub extensions: HashMap<String, serde_json::Value>,
}

/// Outcome returned by a worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    /// Free-form status string, e.g. "completed"
    pub result: String,
    pub metadata: ResultMetadata,
}

impl TaskResult {
    pub fn completed(task_id: impl Into<String>, domain: Domain, duration_ms: u64) -> Self {
        Self {
            task_id: task_id.into(),
            result: "completed".to_string(),
            metadata: ResultMetadata {
                domain: Some(domain),
                duration_ms,
                extensions: HashMap::new(),
            },
        }
    }
}

/// Match returned by a pattern store search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub id: String,
    pub content: String,
    pub similarity: f64,
}
