use thiserror::Error;

pub type Result<T> = std::result::Result<T, AgentError>;

/// What a rejected registration was trying to add.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistrationKind {
    Behaviour,
    Handler,
}

impl std::fmt::Display for RegistrationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistrationKind::Behaviour => f.write_str("behaviour"),
            RegistrationKind::Handler => f.write_str("handler"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid {kind} `{name}`: {reason}")]
    InvalidRegistration {
        kind: RegistrationKind,
        name: String,
        reason: String,
    },
    #[error("no tokio runtime available to schedule behaviour loops")]
    NoRuntime,
    #[error("outbox of agent `{agent}` is closed")]
    MailboxClosed { agent: String },
    #[error("inbox of agent `{0}` already has a consumer")]
    AlreadyConsuming(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AgentError {
    pub fn invalid_registration(
        kind: RegistrationKind,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        AgentError::InvalidRegistration {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn is_invalid_registration(&self) -> bool {
        matches!(self, AgentError::InvalidRegistration { .. })
    }
}
