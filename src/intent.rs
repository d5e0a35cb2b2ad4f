//! Pure-function intent classification and entity extraction.
//!
//! Keyword vocabularies are compiled once into word-boundary regexes rather
//! than matched with substring `contains`, so "what" doesn't also fire on
//! "somewhat" and "api" doesn't fire inside "rapid".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{Entities, Intent};

const ACTION_VERBS: &[&str] = &[
    "check", "test", "run", "execute", "restart", "deploy", "rollback", "apply", "fix", "debug",
];
// Pure creation phrases ("create a program", "build a script") get their own
// intent so the decision engine's safe-zone/code-creation branch is reachable;
// everything else that shapes an existing resource stays Modify.
const CREATE_VERBS: &[&str] = &["create", "build"];
const MODIFY_VERBS: &[&str] = &[
    "add", "setup", "configure", "install", "update", "modify", "change", "remove", "delete",
];
const ANALYZE_VERBS: &[&str] = &["analyze", "analyse", "inspect", "review", "audit", "diagnose"];
const INTERROGATIVES: &[&str] = &["what", "why", "how", "when", "where", "who", "is", "are", "can", "does"];

const SERVICES: &[&str] = &[
    "rag", "retrieval", "inference", "ollama", "architecture", "arch-engine", "web-ui", "redis",
    "database", "postgres", "api",
];
const ACTIONS: &[&str] = &[
    "restart", "deploy", "rollback", "scale", "backup", "optimize", "cache", "migrate", "monitor",
];
const METRICS: &[&str] = &[
    "latency", "throughput", "error rate", "errors", "cpu", "memory", "health score", "success rate",
];
const TECHNOLOGIES: &[&str] = &[
    "docker", "kubernetes", "redis", "postgres", "rust", "python", "compose", "nginx",
];

static ACTION_VERBS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(ACTION_VERBS));
static CREATE_VERBS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(CREATE_VERBS));
static MODIFY_VERBS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(MODIFY_VERBS));
static ANALYZE_VERBS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(ANALYZE_VERBS));
static INTERROGATIVES_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(INTERROGATIVES));
static SERVICES_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(SERVICES));
static ACTIONS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(ACTIONS));
static METRICS_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(METRICS));
static TECHNOLOGIES_RE: Lazy<Vec<Regex>> = Lazy::new(|| compile_word_boundary(TECHNOLOGIES));

fn compile_word_boundary(vocab: &[&str]) -> Vec<Regex> {
    vocab
        .iter()
        .map(|kw| Regex::new(&format!(r"(?i)\b{}\b", regex::escape(kw))).expect("static pattern is valid"))
        .collect()
}

/// Classifies a request's intent by priority-ordered keyword match.
pub fn classify_intent(message: &str) -> Intent {
    if any_match(message, &ACTION_VERBS_RE) {
        Intent::Execute
    } else if any_match(message, &CREATE_VERBS_RE) {
        Intent::Create
    } else if any_match(message, &MODIFY_VERBS_RE) {
        Intent::Modify
    } else if any_match(message, &ANALYZE_VERBS_RE) {
        Intent::Analyze
    } else if any_match(message, &INTERROGATIVES_RE) {
        Intent::Query
    } else {
        Intent::Query
    }
}

/// Extracts fixed-vocabulary entities into four disjoint buckets.
pub fn extract_entities(message: &str) -> Entities {
    Entities {
        services: matches(message, SERVICES, &SERVICES_RE),
        actions: matches(message, ACTIONS, &ACTIONS_RE),
        metrics: matches(message, METRICS, &METRICS_RE),
        technologies: matches(message, TECHNOLOGIES, &TECHNOLOGIES_RE),
    }
}

fn any_match(message: &str, patterns: &[Regex]) -> bool {
    patterns.iter().any(|re| re.is_match(message))
}

fn matches(message: &str, vocab: &[&str], patterns: &[Regex]) -> Vec<String> {
    vocab
        .iter()
        .zip(patterns)
        .filter(|(_, re)| re.is_match(message))
        .map(|(kw, _)| kw.to_string())
        .collect()
}

/// Derives a stable pattern tag from request text, used as the adaptive
/// learning key. Keyword precedence mirrors the task decomposer's own
/// precedence so a request always carries one consistent pattern through
/// planning, decision-making, and learning.
pub fn derive_pattern(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("health") || lower.contains("check") {
        "health_check".to_string()
    } else if lower.contains("add") || lower.contains("create") {
        if lower.contains("redis") || lower.contains("cache") {
            "add_cache".to_string()
        } else if lower.contains("service") {
            "add_service".to_string()
        } else {
            "create_resource".to_string()
        }
    } else if lower.contains("optimize") || lower.contains("improve") {
        "optimization".to_string()
    } else if lower.contains("analyze") {
        "analysis".to_string()
    } else if lower.contains("fix") || lower.contains("debug") {
        "debugging".to_string()
    } else {
        "generic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_verbs_take_priority() {
        assert_eq!(classify_intent("please check the rag service health"), Intent::Execute);
    }

    #[test]
    fn modify_verbs_map_to_modify() {
        assert_eq!(classify_intent("add a redis cache service"), Intent::Modify);
    }

    #[test]
    fn creation_phrases_map_to_create() {
        assert_eq!(
            classify_intent("Create a simple hello world program. Save to playground/hello.py"),
            Intent::Create
        );
        assert_eq!(classify_intent("build a small script"), Intent::Create);
    }

    #[test]
    fn default_is_query() {
        assert_eq!(classify_intent("tell me something"), Intent::Query);
    }

    #[test]
    fn entities_are_disjoint_buckets() {
        let entities = extract_entities("restart the redis service, latency is high");
        assert!(entities.services.contains(&"redis".to_string()));
        assert!(entities.actions.contains(&"restart".to_string()));
        assert!(entities.metrics.contains(&"latency".to_string()));
    }

    #[test]
    fn pattern_derivation_is_deterministic() {
        assert_eq!(derive_pattern("check service health"), "health_check");
        assert_eq!(derive_pattern("add a redis cache"), "add_cache");
    }
}
