use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::message::{Envelope, MessageKind};

/// Reaction to messages of kind `M`.
///
/// `M = dyn Message` receives every message; a concrete kind receives only
/// messages of exactly that kind.
#[async_trait]
pub trait MessageHandler<M: MessageKind + ?Sized>: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn handle(&self, message: Arc<M>) -> Result<()>;
}

/// Handler backed by an async closure. See [`handler_fn`].
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Wraps `Fn(Arc<M>) -> impl Future<Output = Result<()>>` as a
/// [`MessageHandler<M>`]. The accepted kind is taken from the closure's
/// parameter type.
pub fn handler_fn<M, F, Fut>(f: F) -> FnHandler<F>
where
    M: MessageKind + ?Sized,
    F: Fn(Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnHandler {
        name: std::any::type_name::<F>().to_string(),
        f,
    }
}

#[async_trait]
impl<M, F, Fut> MessageHandler<M> for FnHandler<F>
where
    M: MessageKind + ?Sized,
    F: Fn(Arc<M>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, message: Arc<M>) -> Result<()> {
        (self.f)(message).await
    }
}

/// Kind-erased handler as stored in an agent's handler table.
#[async_trait]
pub(crate) trait Dispatch: Send + Sync {
    fn name(&self) -> &str;

    fn accepts(&self) -> &'static str;

    /// Returns `Ok(false)` when the message is not of the accepted kind.
    async fn dispatch(&self, message: &Envelope) -> Result<bool>;
}

pub(crate) struct TypedDispatch<M: ?Sized, H> {
    handler: Arc<H>,
    _kind: PhantomData<fn() -> Arc<M>>,
}

impl<M: ?Sized, H> TypedDispatch<M, H> {
    pub(crate) fn new(handler: Arc<H>) -> Self {
        Self {
            handler,
            _kind: PhantomData,
        }
    }
}

#[async_trait]
impl<M, H> Dispatch for TypedDispatch<M, H>
where
    M: MessageKind + ?Sized,
    H: MessageHandler<M>,
{
    fn name(&self) -> &str {
        self.handler.name()
    }

    fn accepts(&self) -> &'static str {
        M::kind_name()
    }

    async fn dispatch(&self, message: &Envelope) -> Result<bool> {
        match M::select(message) {
            Some(selected) => {
                self.handler.handle(selected).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
