//! Error types for configuration, relaying and response delivery

use crate::routing::Protocol;
use thiserror::Error;

/// Fatal configuration problems, reported before any listener binds
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("malformed rule: '{0}'")]
    MalformedRule(String),

    #[error("must specify https rules after specifying certificate and key: '{0}'")]
    HttpsRuleWithoutTls(String),

    #[error("must specify http+https rules after specifying certificate and key: '{0}'")]
    DualRuleWithoutTls(String),

    #[error("must specify https port after specifying certificate and key")]
    HttpsPortWithoutTls,

    #[error("must define at least one rule")]
    NoRules,
}

/// Failures while talking to a backend on behalf of one request
///
/// Each variant names the step that failed; the underlying fault is kept
/// as the source. `fault_message` renders the whole chain, which is what
/// the client sees on the error page.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("failed to connect to {addr}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("backend handshake failed")]
    Handshake(#[source] hyper::Error),

    #[error("backend request failed")]
    Send(#[source] hyper::Error),

    #[error("failed to read request body")]
    RequestBody(#[source] hyper::Error),

    #[error("failed to read backend response body")]
    ResponseBody(#[source] hyper::Error),

    #[error("no rule is exposed over {0}")]
    NoRule(Protocol),

    #[error("failed to build message")]
    Build(#[from] hyper::http::Error),
}

impl RelayError {
    /// This error followed by every source below it, joined with `": "`
    pub fn fault_message(&self) -> String {
        let mut message = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        message
    }
}

/// A connection that could not be answered because the client is gone
///
/// Values of this type are created and dropped on purpose; there is no
/// one left to report them to.
#[derive(Debug, Error)]
#[error("response delivery failed: {0}")]
pub struct ResponseDeliveryError(#[from] pub hyper::Error);
