use thiserror::Error;

use crate::model::{Capability, CloudKind};

#[derive(Debug, Error)]
pub enum CloudError {
    #[error("capability {capability} is not supported by backend {backend}")]
    Unsupported {
        capability: Capability,
        backend: CloudKind,
    },

    #[error("{what} not implemented for backend {backend}")]
    NotImplemented {
        what: &'static str,
        backend: CloudKind,
    },

    #[error("no cloud provider registered for backend {0}")]
    NoProvider(CloudKind),

    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
}

impl CloudError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Api {
            operation,
            message: message.into(),
        }
    }
}

/// Walk the full error chain and join all causes into one string.
///
/// AWS SDK errors often have terse `Display` impls (e.g. "service error")
/// but useful detail in the source chain.
pub fn format_err_chain(err: &dyn std::error::Error) -> String {
    let mut msg = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        msg.push_str(": ");
        msg.push_str(&cause.to_string());
        source = cause.source();
    }
    msg
}
