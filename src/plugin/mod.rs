// 动态注册模块
//
// Callables described at runtime (plugins, scripting bridges) carry a
// `Signature` instead of a static type; they are validated on registration.

mod signature;

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::trace;

use crate::agent::{Agent, Behaviour, BehaviourId, HandlerId, MessageHandler};
use crate::error::Result;
use crate::message::{Envelope, Message};

pub use signature::{
    validate_behaviour_signature, validate_handler_signature, Param, Signature, TypeTag,
};

type BehaviourCall = dyn Fn(Agent) -> BoxFuture<'static, Result<()>> + Send + Sync;
type HandlerCall = dyn Fn(Envelope) -> BoxFuture<'static, Result<()>> + Send + Sync;

pub struct DynamicBehaviour {
    name: String,
    signature: Signature,
    call: Box<BehaviourCall>,
}

impl DynamicBehaviour {
    pub fn new<F, Fut>(name: impl Into<String>, signature: Signature, call: F) -> Self
    where
        F: Fn(Agent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            signature,
            call: Box::new(move |agent| call(agent).boxed()),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    pub fn validate(&self) -> Result<()> {
        validate_behaviour_signature(&self.name, &self.signature)
    }
}

#[async_trait]
impl Behaviour for DynamicBehaviour {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, agent: &Agent) -> Result<()> {
        (self.call)(agent.clone()).await
    }
}

pub struct DynamicHandler {
    name: String,
    signature: Signature,
    call: Box<HandlerCall>,
}

impl DynamicHandler {
    pub fn new<F, Fut>(name: impl Into<String>, signature: Signature, call: F) -> Self
    where
        F: Fn(Envelope) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            signature,
            call: Box::new(move |message| call(message).boxed()),
        }
    }

    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The declared message kind, if the signature is valid.
    pub fn validate(&self) -> Result<TypeTag> {
        validate_handler_signature(&self.name, &self.signature)
    }
}

#[async_trait]
impl MessageHandler<dyn Message> for DynamicHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: Envelope) -> Result<()> {
        let accepted = self
            .signature
            .params
            .first()
            .and_then(|param| param.annotation)
            .is_some_and(|tag| tag.accepts(&message));
        if !accepted {
            trace!(handler = %self.name, kind = message.kind(), "dynamic handler skipped");
            return Ok(());
        }
        (self.call)(message).await
    }
}

impl Agent {
    /// Validates the declared signature, then registers like
    /// [`Agent::register_behaviour`]. Fails with
    /// [`AgentError::InvalidRegistration`](crate::AgentError::InvalidRegistration)
    /// and leaves the agent untouched when the signature is not `(Agent)`.
    pub fn register_dynamic_behaviour(
        &self,
        behaviour: Arc<DynamicBehaviour>,
    ) -> Result<BehaviourId> {
        behaviour.validate()?;
        self.register_behaviour(behaviour)
    }

    /// Validates the declared signature, then registers like
    /// [`Agent::register_handler`]. Messages of other kinds are skipped.
    pub fn register_dynamic_handler(&self, handler: Arc<DynamicHandler>) -> Result<HandlerId> {
        handler.validate()?;
        Ok(self.register_handler::<dyn Message, _>(handler))
    }
}
