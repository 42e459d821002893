use std::future::Future;

use async_trait::async_trait;

use crate::error::Result;

use super::agent::Agent;

/// Repeating unit of work owned by an agent.
///
/// Once registered, `run` is invoked over and over with the owning agent,
/// yielding to the scheduler between invocations, until the behaviour is
/// unregistered or an invocation returns an error.
#[async_trait]
pub trait Behaviour: Send + Sync + 'static {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    async fn run(&self, agent: &Agent) -> Result<()>;
}

/// Behaviour backed by an async closure. See [`behaviour_fn`].
pub struct FnBehaviour<F> {
    name: String,
    f: F,
}

impl<F> FnBehaviour<F> {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Wraps `Fn(Agent) -> impl Future<Output = Result<()>>` as a [`Behaviour`].
///
/// The closure receives a cloned [`Agent`] handle on every invocation.
pub fn behaviour_fn<F, Fut>(f: F) -> FnBehaviour<F>
where
    F: Fn(Agent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    FnBehaviour {
        name: std::any::type_name::<F>().to_string(),
        f,
    }
}

#[async_trait]
impl<F, Fut> Behaviour for FnBehaviour<F>
where
    F: Fn(Agent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, agent: &Agent) -> Result<()> {
        (self.f)(agent.clone()).await
    }
}
