//! Pattern-based task decomposition: maps request text to a fixed ordered
//! step list. Never consults outside state.

/// Directory prefixes the execution engine is allowed to write generated
/// artifacts into. Mirrors the execution engine's own safe-zone check.
pub const SAFE_ZONES: &[&str] = &["playground/", "generated/", "experiments/", "tic-tac-toe/", "demos/", "examples/"];

const CODE_CREATION_KEYWORDS: &[&str] = &["program", "script", "hello world", "function", "game", "app"];

/// Breaks a request into an ordered step list by keyword pattern matching.
pub fn decompose_task(description: &str) -> Vec<String> {
    let lower = description.to_lowercase();
    let steps: &[&str] = if (lower.contains("create") || lower.contains("build") || lower.contains("write"))
        && CODE_CREATION_KEYWORDS.iter().any(|k| lower.contains(k))
        && !lower.contains("service")
    {
        &[
            "Analyze code requirements",
            "Design code structure",
            "Generate code",
            "Validate generated code",
            "Create file in safe zone",
            "Verify file exists",
        ]
    } else if lower.contains("health") || lower.contains("status") {
        &[
            "Check RAG service health",
            "Check Architecture Engine health",
            "Check Ollama service health",
            "Aggregate health metrics",
            "Generate health report",
        ]
    } else if lower.contains("optimize") || lower.contains("improve") {
        if lower.contains("latency") || lower.contains("performance") {
            &[
                "Measure current latencies",
                "Identify slow services",
                "Analyze bottlenecks",
                "Generate optimization plan",
                "Apply optimizations",
                "Verify improvements",
            ]
        } else {
            &[
                "Analyze current metrics",
                "Identify improvement areas",
                "Generate action plan",
                "Execute improvements",
                "Validate results",
            ]
        }
    } else if lower.contains("add") || lower.contains("create") {
        if lower.contains("service") {
            &[
                "Parse service requirements",
                "Check dependencies",
                "Generate docker-compose config",
                "Validate safety checks",
                "Create backup point",
                "Apply configuration",
                "Verify service startup",
            ]
        } else if lower.contains("redis") || lower.contains("cache") {
            &[
                "Analyze caching needs",
                "Design cache strategy",
                "Generate Redis configuration",
                "Validate integration points",
                "Apply changes",
                "Test cache functionality",
            ]
        } else {
            &[
                "Parse requirements",
                "Design solution",
                "Generate configuration",
                "Validate safety",
                "Apply changes",
                "Verify functionality",
            ]
        }
    } else if lower.contains("fix") || lower.contains("debug") {
        &[
            "Identify problem symptoms",
            "Analyze error logs",
            "Determine root cause",
            "Generate fix strategy",
            "Apply fix",
            "Verify resolution",
        ]
    } else if lower.contains("analyze") || lower.contains("investigate") {
        &[
            "Gather relevant data",
            "Analyze patterns",
            "Identify insights",
            "Generate recommendations",
        ]
    } else if lower.contains("deploy") || lower.contains("rollout") {
        &[
            "Pre-deployment checks",
            "Create backup",
            "Deploy changes",
            "Health check",
            "Rollback if needed",
        ]
    } else {
        &[
            "Understand request context",
            "Gather required information",
            "Plan execution strategy",
            "Execute primary action",
            "Verify results",
            "Generate summary",
        ]
    };
    steps.iter().map(|s| s.to_string()).collect()
}

/// Pulls a safe-zone-prefixed path out of free text, e.g. "save to
/// playground/hello.py" yields `playground/hello.py`. Trims common
/// sentence-ending punctuation a generated filename wouldn't otherwise carry.
pub fn extract_target_path(message: &str) -> Option<String> {
    for word in message.split_whitespace() {
        let trimmed = word.trim_end_matches([',', '!', '?', ';', ':']);
        let trimmed = if trimmed.ends_with('.') && trimmed.matches('.').count() > 1 {
            &trimmed[..trimmed.len() - 1]
        } else {
            trimmed
        };
        if SAFE_ZONES.iter().any(|zone| trimmed.to_lowercase().starts_with(zone)) {
            return Some(trimmed.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_pattern_produces_fixed_steps() {
        let steps = decompose_task("check system health");
        assert_eq!(steps.len(), 5);
        assert_eq!(steps[0], "Check RAG service health");
    }

    #[test]
    fn add_service_takes_priority_over_cache_within_add_branch() {
        let steps = decompose_task("add a new redis service");
        assert_eq!(steps[0], "Parse service requirements");
    }

    #[test]
    fn code_creation_phrase_produces_generation_workflow() {
        let steps = decompose_task("Create a simple hello world program. Save to playground/hello.py");
        assert_eq!(
            steps,
            vec![
                "Analyze code requirements",
                "Design code structure",
                "Generate code",
                "Validate generated code",
                "Create file in safe zone",
                "Verify file exists",
            ]
        );
    }

    #[test]
    fn extract_target_path_strips_trailing_sentence_punctuation() {
        let path = extract_target_path("Create a simple hello world program. Save to playground/hello.py.");
        assert_eq!(path.as_deref(), Some("playground/hello.py"));
    }

    #[test]
    fn extract_target_path_is_none_without_a_safe_zone_token() {
        assert!(extract_target_path("create a hello world program").is_none());
    }

    #[test]
    fn generic_fallback_has_six_steps() {
        let steps = decompose_task("do something unusual");
        assert_eq!(steps.len(), 6);
    }
}
