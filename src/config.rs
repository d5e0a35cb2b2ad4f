//! Process-wide configuration, resolved once from the environment at startup.

use std::time::Duration;

/// Resolved configuration for every subsystem that would otherwise read ad hoc
/// environment variables or hardcode a threshold.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub backends: BackendUrls,
    pub circuit_breaker: CircuitBreakerConfig,
    pub metrics: MetricsConfig,
    pub rate_limit: RateLimitConfig,
    pub http_pool: HttpPoolConfig,
    pub backup_dir: String,
}

#[derive(Debug, Clone)]
pub struct BackendUrls {
    pub ollama_url: String,
    pub qwen_api_url: Option<String>,
    pub qwen_api_key: Option<String>,
    pub retrieval_url: String,
    pub arch_service_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout: Duration,
    pub success_threshold: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricsConfig {
    pub global_window: usize,
    pub per_service_window: usize,
    pub insights_ttl: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub window: Duration,
    pub max_requests: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct HttpPoolConfig {
    pub max_idle: usize,
    pub max_idle_per_host: usize,
}

impl OrchestratorConfig {
    /// Resolve configuration from the environment, falling back to the defaults
    /// documented alongside the backends and the concurrency model.
    pub fn from_env() -> Self {
        Self {
            backends: BackendUrls {
                ollama_url: env_or("OLLAMA_URL", "http://localhost:11434"),
                qwen_api_url: std::env::var("QWEN_API_URL").ok(),
                qwen_api_key: std::env::var("QWEN_API_KEY").ok(),
                retrieval_url: env_or("RETRIEVAL_URL", "http://localhost:8001"),
                arch_service_url: env_or("ARCH_SERVICE_URL", "http://localhost:8002"),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env_parse_or("CIRCUIT_FAILURE_THRESHOLD", 5),
                timeout: Duration::from_secs(env_parse_or("CIRCUIT_TIMEOUT_SECS", 30)),
                success_threshold: env_parse_or("CIRCUIT_SUCCESS_THRESHOLD", 2),
            },
            metrics: MetricsConfig {
                global_window: env_parse_or("METRICS_GLOBAL_WINDOW", 1000),
                per_service_window: env_parse_or("METRICS_PER_SERVICE_WINDOW", 100),
                insights_ttl: Duration::from_secs(env_parse_or("METRICS_INSIGHTS_TTL_SECS", 4)),
            },
            rate_limit: RateLimitConfig {
                window: Duration::from_secs(env_parse_or("RATE_LIMIT_WINDOW_SECS", 60)),
                max_requests: env_parse_or("RATE_LIMIT_MAX_REQUESTS", 100),
            },
            http_pool: HttpPoolConfig {
                max_idle: env_parse_or("HTTP_POOL_MAX_IDLE", 20),
                max_idle_per_host: env_parse_or("HTTP_POOL_MAX_IDLE_PER_HOST", 100),
            },
            backup_dir: env_or("BACKUP_DIR", "backups"),
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        std::env::remove_var("CIRCUIT_FAILURE_THRESHOLD");
        let config = OrchestratorConfig::from_env();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.circuit_breaker.success_threshold, 2);
        assert_eq!(config.metrics.global_window, 1000);
        assert_eq!(config.metrics.per_service_window, 100);
        assert_eq!(config.rate_limit.max_requests, 100);
    }
}
