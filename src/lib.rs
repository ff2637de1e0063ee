//! API gateway resilience core.
//!
//! Sits in front of a set of backend services and applies, to every call,
//! fixed-window rate limiting, response caching, route matching, health-aware
//! load balancing and circuit breaking.

// Core pipeline
pub mod cache;
pub mod gateway;
pub mod registry;
pub mod routing;

// Traffic management
pub mod health;
pub mod load_balancer;
pub mod resilience;
pub mod security;

// Surfaces and cross-cutting concerns
pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use gateway::Gateway;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
