//! vhost-proxy - A virtual-host HTTP/HTTPS reverse proxy
//!
//! Provides:
//! - Host header based routing to backends on a single forward address
//! - HTTP, HTTPS and dual-mode rules, with HTTP to HTTPS redirection
//! - Whole-body request/response relay with HTML error pages on failure

pub mod config;
pub mod error;
pub mod proxy;
pub mod routing;
pub mod rules;
pub mod tls;

pub use config::{ProxyConfig, ProxyOptions, TlsMaterial};
pub use error::{ConfigError, RelayError, ResponseDeliveryError};
pub use proxy::ProxyServer;
pub use routing::{should_redirect, Protocol};
pub use rules::{Mode, Rule, RuleTable};
