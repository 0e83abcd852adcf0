//! Keyword and filename routing
//!
//! Pure functions mapping tasks and individual resources onto domains.
//! Used standalone, by the sharding engine, and by the partition validator's
//! correction pass.

use shared::{Domain, Task};

fn file_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}

pub fn is_test_resource(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = file_name(&lower);
    lower.contains("__tests__")
        || lower.contains("/tests/")
        || lower.starts_with("tests/")
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.starts_with("test_")
        || name.ends_with("_test.rs")
        || name.ends_with("_test.go")
}

pub fn is_config_resource(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = file_name(&lower);
    const CONFIG_EXTENSIONS: [&str; 7] = [".json", ".yaml", ".yml", ".toml", ".ini", ".env", ".lock"];
    const MANIFESTS: [&str; 4] = ["dockerfile", "makefile", "package.json", "cargo.toml"];

    MANIFESTS.contains(&name)
        || CONFIG_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
        || name.starts_with(".env")
        || lower.contains("config")
        || lower.contains(".github/")
}

pub fn is_security_resource(path: &str) -> bool {
    let lower = path.to_lowercase();
    ["auth", "security", "crypto", "secret", "permission"]
        .iter()
        .any(|k| lower.contains(k))
}

pub fn is_doc_resource(path: &str) -> bool {
    let lower = path.to_lowercase();
    let name = file_name(&lower);
    name.ends_with(".md")
        || name.ends_with(".rst")
        || name.ends_with(".txt")
        || lower.starts_with("docs/")
        || lower.contains("/docs/")
}

/// Route a single resource by filename pattern
///
/// Test patterns win over config patterns so `config.test.ts` lands in QA.
pub fn route_file(path: &str, fallback: Domain) -> Domain {
    if is_test_resource(path) {
        Domain::Quality
    } else if is_config_resource(path) {
        Domain::Infrastructure
    } else if is_security_resource(path) {
        Domain::Security
    } else if is_doc_resource(path) {
        Domain::Research
    } else {
        fallback
    }
}

/// Capability a resource most likely needs, used to place synthesized work
pub fn capability_hint(path: &str) -> &'static str {
    match route_file(path, Domain::Development) {
        Domain::Quality => "testing",
        Domain::Infrastructure => "configuration",
        Domain::Security => "security",
        Domain::Research => "documentation",
        Domain::Coordination => "coordination",
        Domain::Development => "coding",
    }
}

/// Score every domain against the task's description and files; highest wins
///
/// Ties prefer the task's own domain, then canonical domain order. A task
/// matching nothing stays in its own domain.
pub fn route_task(task: &Task) -> Domain {
    let description = task.description.to_lowercase();
    let mut scores = [0usize; Domain::ALL.len()];

    for (slot, domain) in Domain::ALL.iter().enumerate() {
        scores[slot] += domain
            .keywords()
            .iter()
            .filter(|keyword| description.contains(*keyword))
            .count();
    }

    for file in &task.files {
        let routed = route_file(file, task.domain);
        if routed != task.domain {
            if let Some(slot) = Domain::ALL.iter().position(|d| *d == routed) {
                scores[slot] += 1;
            }
        }
    }

    let best = scores.iter().copied().max().unwrap_or(0);
    if best == 0 {
        return task.domain;
    }

    let own_slot = Domain::ALL.iter().position(|d| *d == task.domain);
    if let Some(slot) = own_slot {
        if scores[slot] == best {
            return task.domain;
        }
    }

    Domain::ALL
        .iter()
        .zip(scores.iter())
        .find(|(_, score)| **score == best)
        .map(|(domain, _)| *domain)
        .unwrap_or(task.domain)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_file_patterns() {
        assert_eq!(route_file("src/app.test.ts", Domain::Development), Domain::Quality);
        assert_eq!(route_file("tests/integration.rs", Domain::Development), Domain::Quality);
        assert_eq!(route_file("package.json", Domain::Development), Domain::Infrastructure);
        assert_eq!(route_file("deploy/Dockerfile", Domain::Development), Domain::Infrastructure);
        assert_eq!(route_file("src/auth/login.ts", Domain::Development), Domain::Security);
        assert_eq!(route_file("docs/guide.md", Domain::Development), Domain::Research);
        assert_eq!(route_file("src/main.rs", Domain::Coordination), Domain::Coordination);
    }

    #[test]
    fn test_test_pattern_beats_config_pattern() {
        assert_eq!(route_file("src/config.test.ts", Domain::Development), Domain::Quality);
    }

    #[test]
    fn test_route_task_by_keywords() {
        let task = Task::new("t", "Audit the auth flow for security vulnerabilities", Domain::Development);
        assert_eq!(route_task(&task), Domain::Security);
    }

    #[test]
    fn test_route_task_without_matches_keeps_domain() {
        let task = Task::new("t", "zzz", Domain::Research);
        assert_eq!(route_task(&task), Domain::Research);
    }

    #[test]
    fn test_route_task_tie_prefers_own_domain() {
        // "test" -> quality, "implement" -> development: one point each
        let task = Task::new("t", "implement test", Domain::Development);
        assert_eq!(route_task(&task), Domain::Development);
    }

    #[test]
    fn test_capability_hint() {
        assert_eq!(capability_hint("a.spec.ts"), "testing");
        assert_eq!(capability_hint("README.md"), "documentation");
        assert_eq!(capability_hint("src/lib.rs"), "coding");
    }
}
