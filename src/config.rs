//! Proxy configuration
//!
//! `ProxyOptions` carries the values collected by the command line (with TLS
//! files already read into memory); `validate` turns them into the immutable
//! `ProxyConfig` the server runs from.

use crate::error::ConfigError;
use crate::rules::{Mode, RuleTable};

pub const DEFAULT_HTTP_PORT: u16 = 80;
pub const DEFAULT_HTTPS_PORT: u16 = 443;
pub const DEFAULT_LISTEN_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_FORWARD_ADDRESS: &str = "127.0.0.1";

/// PEM encoded certificate chain and private key
#[derive(Clone)]
pub struct TlsMaterial {
    pub certificate: Vec<u8>,
    pub key: Vec<u8>,
}

impl std::fmt::Debug for TlsMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsMaterial")
            .field("certificate", &format_args!("{} bytes", self.certificate.len()))
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Unvalidated settings as supplied by the caller
#[derive(Debug, Clone)]
pub struct ProxyOptions {
    pub listen_address: String,
    pub http_port: u16,
    /// `None` means the default; an explicit value requires TLS
    pub https_port: Option<u16>,
    pub forward_address: String,
    pub tls: Option<TlsMaterial>,
    /// Raw rule arguments, each possibly a comma separated list
    pub rules: Vec<String>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            https_port: None,
            forward_address: DEFAULT_FORWARD_ADDRESS.to_string(),
            tls: None,
            rules: Vec::new(),
        }
    }
}

impl ProxyOptions {
    pub fn validate(self) -> Result<ProxyConfig, ConfigError> {
        let https_enabled = self.tls.is_some();

        if self.https_port.is_some() && !https_enabled {
            return Err(ConfigError::HttpsPortWithoutTls);
        }

        let rules = RuleTable::parse(&self.rules, https_enabled)?;

        Ok(ProxyConfig {
            listen_address: self.listen_address,
            http_port: self.http_port,
            https_port: self.https_port.unwrap_or(DEFAULT_HTTPS_PORT),
            forward_address: self.forward_address,
            tls: self.tls,
            rules,
        })
    }
}

/// Validated proxy configuration
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_address: String,
    pub http_port: u16,
    pub https_port: u16,
    pub forward_address: String,
    pub tls: Option<TlsMaterial>,
    pub rules: RuleTable,
}

impl ProxyConfig {
    /// Whether an HTTP listener is needed
    pub fn serves_http(&self) -> bool {
        !self.rules.http_rules().is_empty()
    }

    /// Whether an HTTPS listener is needed
    pub fn serves_https(&self) -> bool {
        !self.rules.https_rules().is_empty()
    }

    /// Lines reported at startup: active listeners, then one or two lines per rule
    pub fn startup_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();

        if self.serves_http() {
            lines.push(format!(
                "listening for http traffic on {}:{}",
                self.listen_address, self.http_port
            ));
        }
        if self.serves_https() {
            lines.push(format!(
                "listening for https traffic on {}:{}",
                self.listen_address, self.https_port
            ));
        }

        for rule in self.rules.rules() {
            let backend = format!("http://{}:{}/*", self.forward_address, rule.backend_port);
            let http = format!("http://{}:{}/*", rule.host, self.http_port);
            let https = format!("https://{}:{}/*", rule.host, self.https_port);

            match rule.mode {
                Mode::Http => lines.push(format!("{} -> {}", http, backend)),
                Mode::Https => lines.push(format!("{} -> {}", https, backend)),
                Mode::HttpAndHttps => {
                    lines.push(format!("{} -> {}", http, https));
                    lines.push(format!("{} -> {}", https, backend));
                }
            }
        }

        lines
    }
}
