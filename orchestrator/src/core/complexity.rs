//! Complexity scoring and task sharding
//!
//! Scores a task from its file count, dependency count, estimated size and
//! priority, decides whether it must be split, and splits it into at most
//! one shard per configured domain while keeping the original file set
//! exactly covered.

use std::collections::{BTreeMap, HashSet};

use shared::{process_debug, Domain, ProcessId, Task, TaskShard};

use super::routing::route_file;
use crate::config::ShardingConfig;
use crate::error::{OrchestratorError, OrchestratorResult};

const FILE_WEIGHT: f64 = 10.0;
const DEPENDENCY_WEIGHT: f64 = 5.0;
/// Estimated size units per complexity point
const SIZE_DIVISOR: f64 = 50.0;

/// Weighted complexity score; deterministic and pure
pub fn analyze_complexity(task: &Task) -> f64 {
    task.files.len() as f64 * FILE_WEIGHT
        + task.dependencies.len() as f64 * DEPENDENCY_WEIGHT
        + task.estimated_size as f64 / SIZE_DIVISOR
        + task.priority.weight()
}

/// Splits oversized tasks into domain-aligned shards
#[derive(Debug, Clone)]
pub struct ShardingEngine {
    config: ShardingConfig,
    domains: Vec<Domain>,
}

impl ShardingEngine {
    pub fn new(config: ShardingConfig, domains: Vec<Domain>) -> Self {
        Self { config, domains }
    }

    pub fn domains(&self) -> &[Domain] {
        &self.domains
    }

    pub fn analyze_complexity(&self, task: &Task) -> f64 {
        analyze_complexity(task)
    }

    /// True when the score exceeds the threshold or the file count exceeds the cap
    pub fn should_shard(&self, task: &Task) -> bool {
        analyze_complexity(task) > self.config.complexity_threshold
            || task.files.len() > self.config.max_files_per_task
    }

    /// Split a task into between 2 and `domains.len()` shards
    ///
    /// The union of shard files equals the task's file set and no file lands
    /// in two shards. Shards owning a file that the task lists as a dependency
    /// come first; every other shard depends on them.
    pub fn shard(&self, task: &Task) -> OrchestratorResult<Vec<TaskShard>> {
        let files = unique_files(&task.files);
        if files.len() < 2 {
            return Err(OrchestratorError::ShardingError {
                task_id: task.id.clone(),
                reason: format!("{} distinct file(s); at least 2 are required", files.len()),
            });
        }

        let fallback = self.resolve_domain(task.domain);
        let mut groups: BTreeMap<Domain, Vec<String>> = BTreeMap::new();
        for file in files {
            let domain = self.resolve_domain_or(route_file(&file, fallback), fallback);
            groups.entry(domain).or_default().push(file);
        }

        if groups.len() == 1 {
            self.split_single_group(task, &mut groups)?;
        }

        // Providers first, each group keeps canonical domain order otherwise
        let mut ordered: Vec<(Domain, Vec<String>, bool)> = groups
            .into_iter()
            .map(|(domain, files)| {
                let provides = files.iter().any(|f| task.dependencies.contains(f));
                (domain, files, provides)
            })
            .collect();
        ordered.sort_by_key(|(_, _, provides)| !*provides);

        let total_shards = ordered.len();
        let total_files: usize = ordered.iter().map(|(_, files, _)| files.len()).sum();
        let mut provider_ids: Vec<String> = Vec::new();
        let mut shards = Vec::with_capacity(total_shards);
        let mut size_assigned = 0u64;

        for (index, (domain, files, provides)) in ordered.into_iter().enumerate() {
            let shard_id = TaskShard::shard_id_for(&task.id, index);
            let depends_on_shard_ids = provider_ids.clone();

            let mut subtask = task.restricted_to(shard_id.clone(), files, domain);
            subtask.estimated_size = if index + 1 == total_shards {
                task.estimated_size.saturating_sub(size_assigned)
            } else {
                // Widened so near-max sizes cannot overflow; the share never exceeds the total
                (task.estimated_size as u128 * subtask.files.len() as u128 / total_files as u128) as u64
            };
            size_assigned = size_assigned.saturating_add(subtask.estimated_size);

            if provides {
                provider_ids.push(shard_id.clone());
            }

            shards.push(TaskShard {
                original_task_id: task.id.clone(),
                shard_id,
                shard_index: index,
                total_shards,
                assigned_domain: domain,
                subtask,
                depends_on_shard_ids,
            });
        }

        process_debug!(
            ProcessId::current(),
            "✂️ Task {} split into {} shards",
            task.id,
            shards.len()
        );
        Ok(shards)
    }

    /// Halve a lone group so the task still yields two shards
    fn split_single_group(&self, task: &Task, groups: &mut BTreeMap<Domain, Vec<String>>) -> OrchestratorResult<()> {
        let Some((&domain, _)) = groups.iter().next() else {
            return Ok(());
        };
        let Some(second) = self.domains.iter().copied().find(|d| *d != domain) else {
            return Err(OrchestratorError::ShardingError {
                task_id: task.id.clone(),
                reason: "at least two domains must be configured".to_string(),
            });
        };
        if let Some(files) = groups.get_mut(&domain) {
            let mid = files.len() / 2;
            let tail = files.split_off(mid);
            groups.insert(second, tail);
        }
        Ok(())
    }

    fn resolve_domain(&self, preferred: Domain) -> Domain {
        self.resolve_domain_or(preferred, self.domains.first().copied().unwrap_or(preferred))
    }

    fn resolve_domain_or(&self, preferred: Domain, fallback: Domain) -> Domain {
        if self.domains.contains(&preferred) {
            preferred
        } else {
            fallback
        }
    }
}

fn unique_files(files: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    files
        .iter()
        .filter(|f| seen.insert(f.as_str()))
        .cloned()
        .collect()
}
