//! Virtual host rules and the table built from them
//!
//! A rule token has the form `[@|#]<host>:<port>`:
//! - no prefix: reachable over HTTP only
//! - `@`: reachable over HTTPS only
//! - `#`: reachable over both; the HTTP side redirects to the HTTPS side

use crate::error::ConfigError;

/// Which listeners a rule is exposed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Http,
    Https,
    HttpAndHttps,
}

impl Mode {
    /// Whether the rule is reachable on the HTTP listener
    pub fn on_http(self) -> bool {
        match self {
            Mode::Http | Mode::HttpAndHttps => true,
            Mode::Https => false,
        }
    }

    /// Whether the rule is reachable on the HTTPS listener
    pub fn on_https(self) -> bool {
        match self {
            Mode::Https | Mode::HttpAndHttps => true,
            Mode::Http => false,
        }
    }
}

/// One virtual host mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// Lowercase host name without port
    pub host: String,
    /// Port on the forward address
    pub backend_port: u16,
    pub mode: Mode,
}

impl Rule {
    pub fn new(host: impl Into<String>, backend_port: u16, mode: Mode) -> Self {
        Self {
            host: host.into().to_lowercase(),
            backend_port,
            mode,
        }
    }

    /// Parse a single rule token
    ///
    /// `https_enabled` says whether certificate and key were supplied; `@` and
    /// `#` rules are refused without them.
    pub fn parse(token: &str, https_enabled: bool) -> Result<Self, ConfigError> {
        let malformed = || ConfigError::MalformedRule(token.to_string());

        let fields: Vec<&str> = token.split(':').collect();
        if fields.len() != 2 {
            return Err(malformed());
        }

        let host = fields[0].trim();
        let port = fields[1].trim();

        let (host, mode) = if let Some(rest) = host.strip_prefix('@') {
            if !https_enabled {
                return Err(ConfigError::HttpsRuleWithoutTls(token.to_string()));
            }
            (rest, Mode::Https)
        } else if let Some(rest) = host.strip_prefix('#') {
            if !https_enabled {
                return Err(ConfigError::DualRuleWithoutTls(token.to_string()));
            }
            (rest, Mode::HttpAndHttps)
        } else {
            (host, Mode::Http)
        };

        if host.is_empty() {
            return Err(malformed());
        }
        let backend_port: u16 = port.parse().map_err(|_| malformed())?;

        Ok(Self::new(host, backend_port, mode))
    }
}

/// All configured rules, plus the per-protocol views used for lookup
///
/// Built once at startup and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleTable {
    rules: Vec<Rule>,
    http: Vec<Rule>,
    https: Vec<Rule>,
}

impl RuleTable {
    /// Build a table from already parsed rules, in registration order
    pub fn new(rules: Vec<Rule>) -> Result<Self, ConfigError> {
        if rules.is_empty() {
            return Err(ConfigError::NoRules);
        }

        let http = rules.iter().filter(|r| r.mode.on_http()).cloned().collect();
        let https = rules.iter().filter(|r| r.mode.on_https()).cloned().collect();

        Ok(Self { rules, http, https })
    }

    /// Parse raw rule tokens, each of which may itself be a comma separated list
    pub fn parse<I, S>(tokens: I, https_enabled: bool) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut rules = Vec::new();
        for arg in tokens {
            for token in arg.as_ref().split(',') {
                rules.push(Rule::parse(token, https_enabled)?);
            }
        }
        Self::new(rules)
    }

    /// Every rule in registration order
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Rules reachable on the HTTP listener
    pub fn http_rules(&self) -> &[Rule] {
        &self.http
    }

    /// Rules reachable on the HTTPS listener
    pub fn https_rules(&self) -> &[Rule] {
        &self.https
    }
}
