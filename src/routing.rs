//! Host based rule resolution and the HTTP to HTTPS redirect policy

use crate::rules::{Mode, Rule, RuleTable};
use std::fmt;

/// The listener a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Http => f.write_str("http"),
            Protocol::Https => f.write_str("https"),
        }
    }
}

impl RuleTable {
    /// Rules reachable over `protocol`
    pub fn rules_for(&self, protocol: Protocol) -> &[Rule] {
        match protocol {
            Protocol::Http => self.http_rules(),
            Protocol::Https => self.https_rules(),
        }
    }

    /// Pick the rule for a request
    ///
    /// The first rule of the protocol is the default. When a Host header is
    /// present it is lowercased and stripped of any `:port`, and the last rule
    /// with exactly that host wins. Returns `None` only when no rule is
    /// exposed on `protocol`, in which case no listener exists for it.
    pub fn resolve(&self, protocol: Protocol, host_header: Option<&str>) -> Option<&Rule> {
        let rules = self.rules_for(protocol);
        let default = rules.first()?;

        let Some(header) = host_header else {
            return Some(default);
        };

        let host = normalize_host(header);
        Some(
            rules
                .iter()
                .rev()
                .find(|rule| rule.host == host)
                .unwrap_or(default),
        )
    }
}

/// Lowercase a Host header value and drop everything from the first colon
pub fn normalize_host(header: &str) -> String {
    let lower = header.to_lowercase();
    match lower.split_once(':') {
        Some((host, _)) => host.to_string(),
        None => lower,
    }
}

/// HTTP requests for dual-mode hosts are redirected instead of forwarded
pub fn should_redirect(protocol: Protocol, rule: &Rule) -> bool {
    match (protocol, rule.mode) {
        (Protocol::Http, Mode::HttpAndHttps) => true,
        (Protocol::Http, Mode::Http | Mode::Https) => false,
        (Protocol::Https, _) => false,
    }
}

/// `Location` for a redirect of `path_and_query` to the HTTPS listener
pub fn redirect_location(rule: &Rule, https_port: u16, path_and_query: &str) -> String {
    format!("https://{}:{}{}", rule.host, https_port, path_and_query)
}
