pub mod agent;
pub mod config;
pub mod error;
pub mod mailbox;
pub mod message;
pub mod plugin;
pub mod utils;

pub use agent::{
    behaviour_fn, handler_fn, Agent, Behaviour, BehaviourId, FnBehaviour, FnHandler, HandlerId,
    MessageHandler,
};
pub use config::{EnvConfig, RuntimeSettings};
pub use error::{AgentError, RegistrationKind, Result};
pub use mailbox::{mailbox, MailboxReceiver, MailboxSender};
pub use message::{envelope, Envelope, Message, MessageKind, TextMessage};
pub use plugin::{DynamicBehaviour, DynamicHandler, Param, Signature, TypeTag};
pub use utils::logging;
