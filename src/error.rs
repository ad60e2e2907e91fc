use thiserror::Error;

pub type Result<T> = std::result::Result<T, BootstrapError>;

/// Failure categories for the bootstrap run. Every component reports
/// through this type so callers can branch on the category instead of
/// parsing messages.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Detected before any external call is made (missing payload
    /// fields, incomplete volume spec, malformed user data).
    #[error("configuration error: {0}")]
    Config(String),

    /// A call to an external system (S3, EC2, IMDS, mount, unzip)
    /// failed; carries the underlying cause.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: std::io::Error,
    },

    /// An `ec2-metadata.*` directive could not be resolved; names the
    /// offending property key.
    #[error("unresolved placeholder {key}: {reason}")]
    Resolution { key: String, reason: String },

    /// A host service failed to enable or start; halts the remaining
    /// service list.
    #[error("service {service}: {source}")]
    Service {
        service: String,
        #[source]
        source: std::io::Error,
    },
}

impl BootstrapError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn external(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::External {
            context: context.into(),
            source,
        }
    }
}
