//! Partition validation (MECE check)
//!
//! Verifies that a set of per-domain partitions covers every resource exactly
//! once, optionally repairs overlaps and gaps, and reports load imbalance
//! between domains. Balance findings are advisory; nothing is ever moved
//! because of them.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::Serialize;
use shared::{process_debug, process_warn, Domain, ProcessId, Task};

use super::routing::{capability_hint, is_config_resource, is_doc_resource, is_test_resource};
use crate::config::PartitionConfig;
use crate::events::{EventBus, Notification};

/// Pseudo-resources naming external dependencies; never counted as gaps
pub const DEPENDENCY_PREFIX: &str = "dep:";

/// Load contributed by each file in balance analysis
const FILE_LOAD_WEIGHT: f64 = 10.0;

/// A task assigned to one domain
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub domain: Domain,
    pub task: Task,
}

impl Partition {
    pub fn new(domain: Domain, task: Task) -> Self {
        Self { domain, task }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Medium,
    High,
}

/// A resource owned by more than one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlap {
    pub resource: String,
    pub domains: Vec<Domain>,
    pub severity: Severity,
}

/// A resource owned by nobody
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Gap {
    pub resource: String,
    pub severity: Severity,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationReport {
    pub valid: bool,
    pub coverage_percent: f64,
    pub overlaps: Vec<Overlap>,
    pub gaps: Vec<Gap>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BalanceReport {
    pub loads: BTreeMap<Domain, f64>,
    pub mean_load: f64,
    /// Domains deviating from the mean by more than the configured threshold
    pub imbalanced: Vec<Domain>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PartitionMetrics {
    pub validations: u64,
    pub valid_passes: u64,
    pub overlaps_found: u64,
    pub gaps_found: u64,
    pub corrections_applied: u64,
    pub last_coverage_percent: f64,
}

/// Per-pass bookkeeping; rebuilt from scratch by every validation
#[derive(Debug, Clone, Default)]
pub struct DistributionMatrix {
    pub domain_to_task_ids: BTreeMap<Domain, BTreeSet<String>>,
    /// Single owner per resource; later partitions overwrite earlier ones
    pub resource_to_domain: HashMap<String, Domain>,
    pub task_by_id: HashMap<String, Task>,
}

impl DistributionMatrix {
    fn reset(&mut self) {
        self.domain_to_task_ids.clear();
        self.resource_to_domain.clear();
        self.task_by_id.clear();
    }

    fn record(&mut self, partition: &Partition) {
        self.domain_to_task_ids
            .entry(partition.domain)
            .or_default()
            .insert(partition.task.id.clone());
        self.task_by_id.insert(partition.task.id.clone(), partition.task.clone());

        for file in &partition.task.files {
            if let Some(previous) = self.resource_to_domain.insert(file.clone(), partition.domain) {
                if previous != partition.domain {
                    process_warn!(
                        ProcessId::current(),
                        "⚠️ Resource {} reassigned from {} to {}",
                        file,
                        previous,
                        partition.domain
                    );
                }
            }
        }
    }
}

pub struct PartitionValidator {
    config: PartitionConfig,
    domains: Vec<Domain>,
    matrix: DistributionMatrix,
    metrics: PartitionMetrics,
    events: EventBus,
}

impl PartitionValidator {
    pub fn new(config: PartitionConfig, domains: Vec<Domain>, events: EventBus) -> Self {
        Self {
            config,
            domains,
            matrix: DistributionMatrix::default(),
            metrics: PartitionMetrics::default(),
            events,
        }
    }

    pub fn matrix(&self) -> &DistributionMatrix {
        &self.matrix
    }

    pub fn metrics(&self) -> &PartitionMetrics {
        &self.metrics
    }

    /// Check that `partitions` cover `full_resources` exactly once
    pub fn validate(&mut self, partitions: &[Partition], full_resources: &[String]) -> ValidationReport {
        self.matrix.reset();

        let mut claims: BTreeMap<&str, Vec<Domain>> = BTreeMap::new();
        for partition in partitions {
            self.matrix.record(partition);
            for file in &partition.task.files {
                let owners = claims.entry(file.as_str()).or_default();
                if !owners.contains(&partition.domain) {
                    owners.push(partition.domain);
                }
            }
        }

        let overlaps: Vec<Overlap> = if self.config.allow_redundancy {
            Vec::new()
        } else {
            claims
                .iter()
                .filter(|(_, domains)| domains.len() > 1)
                .map(|(resource, domains)| Overlap {
                    resource: resource.to_string(),
                    domains: domains.clone(),
                    severity: if domains.len() > 2 { Severity::High } else { Severity::Medium },
                })
                .collect()
        };

        let required: BTreeSet<&str> = full_resources
            .iter()
            .map(String::as_str)
            .filter(|r| !r.starts_with(DEPENDENCY_PREFIX))
            .collect();
        let gaps: Vec<Gap> = required
            .iter()
            .filter(|r| !claims.contains_key(*r))
            .map(|r| Gap {
                resource: r.to_string(),
                severity: Severity::Medium,
            })
            .collect();

        let coverage_percent = if required.is_empty() {
            100.0
        } else {
            (required.len() - gaps.len()) as f64 / required.len() as f64 * 100.0
        };

        let suggestions = suggestions_for(&overlaps, &gaps);
        let valid = overlaps.is_empty() && gaps.is_empty();

        self.metrics.validations += 1;
        if valid {
            self.metrics.valid_passes += 1;
        }
        self.metrics.overlaps_found += overlaps.len() as u64;
        self.metrics.gaps_found += gaps.len() as u64;
        self.metrics.last_coverage_percent = coverage_percent;

        if !valid {
            process_warn!(
                ProcessId::current(),
                "⚠️ Partition set not MECE: {} overlaps, {} gaps, {:.1}% coverage",
                overlaps.len(),
                gaps.len(),
                coverage_percent
            );
        }

        ValidationReport {
            valid,
            coverage_percent,
            overlaps,
            gaps,
            suggestions,
        }
    }

    /// Repair high-severity overlaps and fill gaps with synthesized tasks
    pub fn correct(&mut self, partitions: &[Partition], report: &ValidationReport) -> Vec<Partition> {
        let mut corrected = partitions.to_vec();
        let mut applied = 0u64;

        for overlap in report.overlaps.iter().filter(|o| o.severity == Severity::High) {
            let owner = preferred_owner(&overlap.resource, &overlap.domains);
            let mut kept = false;
            for partition in corrected.iter_mut() {
                if !partition.task.files.contains(&overlap.resource) {
                    continue;
                }
                if partition.domain == owner && !kept {
                    kept = true;
                    continue;
                }
                partition.task.files.retain(|f| f != &overlap.resource);
            }
            process_debug!(
                ProcessId::current(),
                "🔧 Resource {} now owned by {}",
                overlap.resource,
                owner
            );
            applied += 1;
        }

        for (index, gap) in report.gaps.iter().enumerate() {
            let hint = capability_hint(&gap.resource);
            let domain = self.best_capability_match(hint);
            let task = Task::new(
                format!("gap-{}", index + 1),
                format!("Cover unassigned resource {}", gap.resource),
                domain,
            )
            .with_files([gap.resource.clone()])
            .with_capabilities([hint]);

            process_debug!(
                ProcessId::current(),
                "🔧 Gap {} assigned to {} as {}",
                gap.resource,
                domain,
                task.id
            );
            corrected.push(Partition::new(domain, task));
            applied += 1;
        }

        self.metrics.corrections_applied += applied;
        corrected
    }

    /// Per-domain load and advisories for outliers; never reassigns work
    pub fn analyze_balance(&self, partitions: &[Partition]) -> BalanceReport {
        let mut loads: BTreeMap<Domain, f64> = BTreeMap::new();
        for partition in partitions {
            *loads.entry(partition.domain).or_insert(0.0) +=
                partition.task.estimated_size as f64 + partition.task.files.len() as f64 * FILE_LOAD_WEIGHT;
        }

        let mean_load = if loads.is_empty() {
            0.0
        } else {
            loads.values().sum::<f64>() / loads.len() as f64
        };

        let mut imbalanced = Vec::new();
        if mean_load > 0.0 {
            for (domain, load) in &loads {
                let deviation = (load - mean_load).abs() / mean_load;
                if deviation > self.config.imbalance_threshold {
                    imbalanced.push(*domain);
                    self.events.emit(Notification::BalanceAdvisory {
                        domain: *domain,
                        load: *load,
                        mean_load,
                        deviation,
                    });
                }
            }
        }

        BalanceReport {
            loads,
            mean_load,
            imbalanced,
        }
    }

    fn best_capability_match(&self, capability: &str) -> Domain {
        self.domains
            .iter()
            .copied()
            .find(|d| d.has_capability(capability))
            .or_else(|| self.domains.first().copied())
            .unwrap_or(Domain::Coordination)
    }
}

/// Filename heuristics pick the owner when it is among the claimants
fn preferred_owner(resource: &str, claimants: &[Domain]) -> Domain {
    let preferred = if is_test_resource(resource) {
        Some(Domain::Quality)
    } else if is_config_resource(resource) {
        Some(Domain::Infrastructure)
    } else if is_doc_resource(resource) {
        Some(Domain::Research)
    } else {
        None
    };

    preferred
        .filter(|d| claimants.contains(d))
        .or_else(|| claimants.first().copied())
        .unwrap_or(Domain::Coordination)
}

fn suggestions_for(overlaps: &[Overlap], gaps: &[Gap]) -> Vec<String> {
    let mut suggestions = Vec::new();
    for overlap in overlaps {
        let owner = preferred_owner(&overlap.resource, &overlap.domains);
        suggestions.push(format!(
            "Assign {} to {} only (claimed by {})",
            overlap.resource,
            owner,
            overlap
                .domains
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    for gap in gaps {
        suggestions.push(format!(
            "Create a task covering {} (needs {})",
            gap.resource,
            capability_hint(&gap.resource)
        ));
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> PartitionValidator {
        PartitionValidator::new(PartitionConfig::default(), Domain::ALL.to_vec(), EventBus::default())
    }

    fn partition(id: &str, domain: Domain, files: &[&str]) -> Partition {
        Partition::new(domain, Task::new(id, "work", domain).with_files(files.iter().copied()))
    }

    fn resources(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn test_disjoint_partitions_are_valid() {
        let partitions = vec![
            partition("a", Domain::Development, &["src/a.ts"]),
            partition("b", Domain::Quality, &["src/a.test.ts"]),
        ];
        let report = validator().validate(&partitions, &resources(&["src/a.ts", "src/a.test.ts"]));

        assert!(report.valid);
        assert!(report.overlaps.is_empty());
        assert_eq!(report.coverage_percent, 100.0);
    }

    #[test]
    fn test_shared_file_is_one_medium_overlap() {
        let partitions = vec![
            partition("a", Domain::Development, &["src/shared.ts", "src/a.ts"]),
            partition("b", Domain::Security, &["src/shared.ts"]),
        ];
        let report = validator().validate(&partitions, &resources(&["src/shared.ts", "src/a.ts"]));

        assert!(!report.valid);
        assert_eq!(report.overlaps.len(), 1);
        assert_eq!(report.overlaps[0].resource, "src/shared.ts");
        assert_eq!(report.overlaps[0].severity, Severity::Medium);
        assert_eq!(report.suggestions.len(), 1);
    }

    #[test]
    fn test_three_claimants_is_high_severity() {
        let partitions = vec![
            partition("a", Domain::Development, &["x.rs"]),
            partition("b", Domain::Security, &["x.rs"]),
            partition("c", Domain::Research, &["x.rs"]),
        ];
        let report = validator().validate(&partitions, &resources(&["x.rs"]));
        assert_eq!(report.overlaps[0].severity, Severity::High);
    }

    #[test]
    fn test_same_domain_claims_are_not_overlaps() {
        let partitions = vec![
            partition("a", Domain::Development, &["x.rs"]),
            partition("b", Domain::Development, &["x.rs"]),
        ];
        let report = validator().validate(&partitions, &resources(&["x.rs"]));
        assert!(report.valid);
    }

    #[test]
    fn test_redundancy_suppresses_overlaps() {
        let config = PartitionConfig {
            allow_redundancy: true,
            ..PartitionConfig::default()
        };
        let mut validator = PartitionValidator::new(config, Domain::ALL.to_vec(), EventBus::default());
        let partitions = vec![
            partition("a", Domain::Development, &["x.rs"]),
            partition("b", Domain::Quality, &["x.rs"]),
        ];
        assert!(validator.validate(&partitions, &resources(&["x.rs"])).valid);
    }

    #[test]
    fn test_gaps_skip_dependency_resources() {
        let partitions = vec![partition("a", Domain::Development, &["src/a.ts"])];
        let report = validator().validate(
            &partitions,
            &resources(&["src/a.ts", "docs/guide.md", "dep:lodash"]),
        );

        assert_eq!(report.gaps.len(), 1);
        assert_eq!(report.gaps[0].resource, "docs/guide.md");
        assert_eq!(report.gaps[0].severity, Severity::Medium);
        assert_eq!(report.coverage_percent, 50.0);
    }

    #[test]
    fn test_matrix_is_reset_each_pass() {
        let mut validator = validator();
        validator.validate(&[partition("a", Domain::Development, &["a.rs"])], &resources(&["a.rs"]));
        validator.validate(&[partition("b", Domain::Quality, &["b.rs"])], &resources(&["b.rs"]));

        let matrix = validator.matrix();
        assert!(!matrix.task_by_id.contains_key("a"));
        assert_eq!(matrix.resource_to_domain.get("b.rs"), Some(&Domain::Quality));
        assert_eq!(validator.metrics().validations, 2);
    }

    #[test]
    fn test_correction_resolves_high_overlap_and_fills_gap() {
        let mut validator = validator();
        let partitions = vec![
            partition("a", Domain::Development, &["src/app.test.ts"]),
            partition("b", Domain::Quality, &["src/app.test.ts"]),
            partition("c", Domain::Security, &["src/app.test.ts"]),
        ];
        let full = resources(&["src/app.test.ts", "deploy/config.yaml"]);
        let report = validator.validate(&partitions, &full);

        let corrected = validator.correct(&partitions, &report);
        let owners: Vec<Domain> = corrected
            .iter()
            .filter(|p| p.task.files.contains(&"src/app.test.ts".to_string()))
            .map(|p| p.domain)
            .collect();
        assert_eq!(owners, vec![Domain::Quality]);

        let gap_task = corrected.iter().find(|p| p.task.id == "gap-1").unwrap();
        assert_eq!(gap_task.domain, Domain::Infrastructure);

        assert!(validator.validate(&corrected, &full).valid);
    }

    #[test]
    fn test_balance_flags_outliers_without_moving_work() {
        let events = EventBus::default();
        let mut rx = events.subscribe();
        let validator = PartitionValidator::new(PartitionConfig::default(), Domain::ALL.to_vec(), events);

        let partitions = vec![
            Partition::new(
                Domain::Development,
                Task::new("a", "x", Domain::Development).with_estimated_size(1000),
            ),
            Partition::new(Domain::Quality, Task::new("b", "x", Domain::Quality).with_estimated_size(100)),
        ];
        let report = validator.analyze_balance(&partitions);

        assert_eq!(report.mean_load, 550.0);
        assert_eq!(report.imbalanced, vec![Domain::Development, Domain::Quality]);
        assert!(matches!(rx.try_recv(), Ok(Notification::BalanceAdvisory { .. })));
    }
}
