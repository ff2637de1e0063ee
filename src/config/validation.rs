//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (windows, thresholds and timeouts > 0)
//! - Check service definitions (unique names, parseable URLs, route patterns)
//! - Keep the request timeout above the worst-case retry budget of every route,
//!   so the breaker always sees the outcome of an attempt
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::schema::GatewayConfig;
use crate::registry::RouteDefinition;
use crate::resilience::timeouts::worst_case_budget;
use crate::routing::PathPattern;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.rate_limit.window_ms == 0 {
        errors.push(ValidationError::new("rate_limit.window_ms", "must be greater than 0"));
    }
    if config.rate_limit.max_requests == 0 {
        errors.push(ValidationError::new("rate_limit.max_requests", "must be greater than 0"));
    }
    if config.circuit_breaker.failure_threshold == 0 {
        errors.push(ValidationError::new(
            "circuit_breaker.failure_threshold",
            "must be greater than 0",
        ));
    }

    let hc = &config.load_balancing.health_check;
    if hc.enabled && hc.interval_ms == 0 {
        errors.push(ValidationError::new(
            "load_balancing.health_check.interval_ms",
            "must be greater than 0",
        ));
    }
    if hc.timeout_ms == 0 {
        errors.push(ValidationError::new(
            "load_balancing.health_check.timeout_ms",
            "must be greater than 0",
        ));
    }
    if hc.unhealthy_threshold == 0 || hc.healthy_threshold == 0 {
        errors.push(ValidationError::new(
            "load_balancing.health_check",
            "thresholds must be greater than 0",
        ));
    }

    if config.timeouts.upstream_ms == 0 {
        errors.push(ValidationError::new("timeouts.upstream_ms", "must be greater than 0"));
    }
    let request_budget = Duration::from_secs(config.timeouts.request_secs);
    if request_budget.is_zero() {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    } else if worst_case_budget(&RouteDefinition::any("/*"), &config.timeouts, &config.retries) > request_budget {
        errors.push(ValidationError::new(
            "timeouts.request_secs",
            "shorter than the default upstream timeout with retries",
        ));
    }

    for method in &config.cache.cacheable_methods {
        if axum::http::Method::from_bytes(method.as_bytes()).is_err() {
            errors.push(ValidationError::new(
                "cache.cacheable_methods",
                format!("'{method}' is not an HTTP method"),
            ));
        }
    }

    let prefix = &config.gateway.path_prefix;
    if !prefix.is_empty() && !prefix.starts_with('/') {
        errors.push(ValidationError::new("gateway.path_prefix", "must start with '/'"));
    }

    let mut names = HashSet::new();
    for (i, service) in config.services.iter().enumerate() {
        let field = format!("services[{i}]");
        if service.name.is_empty() {
            errors.push(ValidationError::new(&field, "name must not be empty"));
        } else if !names.insert(service.name.as_str()) {
            errors.push(ValidationError::new(
                &field,
                format!("duplicate service name '{}'", service.name),
            ));
        }

        for url in service.instance_urls() {
            if let Err(e) = Url::parse(url) {
                errors.push(ValidationError::new(&field, format!("invalid url '{url}': {e}")));
            }
        }

        for (j, route) in service.routes.iter().enumerate() {
            if let Err(e) = PathPattern::parse(&route.path) {
                errors.push(ValidationError::new(format!("{field}.routes[{j}]"), e.to_string()));
            }
            let budget = worst_case_budget(route, &config.timeouts, &config.retries);
            if !request_budget.is_zero() && budget > request_budget {
                errors.push(ValidationError::new(
                    format!("{field}.routes[{j}]"),
                    format!(
                        "upstream timeout with retries ({}ms) exceeds timeouts.request_secs",
                        budget.as_millis()
                    ),
                ));
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
