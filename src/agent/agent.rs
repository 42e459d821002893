use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard, OwnedMutexGuard};
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{debug, error, info, trace, warn};

use crate::error::{AgentError, Result};
use crate::mailbox::{MailboxReceiver, MailboxSender};
use crate::message::{envelope, Envelope, Message, MessageKind};

use super::behaviour::Behaviour;
use super::handler::{Dispatch, MessageHandler, TypedDispatch};
use super::registry::{
    BehaviourId, BehaviourSlot, BehaviourTable, HandlerId, HandlerTable, Identity,
};

/// An agent: one inbox it consumes, one outbox it emits into, a handler
/// table and a set of running behaviour loops.
///
/// `Agent` is a cheap handle; clones refer to the same agent. Behaviour
/// loops are scheduled on the tokio runtime as soon as they are registered,
/// while the inbox is only consumed inside [`Agent::run`] or
/// [`Agent::consume_messages`]. There is no stop method: cancel the task
/// driving `run` and unregister behaviours, or drop every handle.
#[derive(Clone)]
pub struct Agent {
    inner: Arc<AgentInner>,
}

struct AgentInner {
    name: String,
    inbox: Arc<AsyncMutex<MailboxReceiver>>,
    outbox: MailboxSender,
    /// Consumption task left running by a `run` that returned a behaviour
    /// failure. The next `run` picks it up again.
    consumer: Mutex<Option<JoinHandle<Result<()>>>>,
    handlers: RwLock<HandlerTable>,
    behaviours: Mutex<BehaviourTable>,
    failures_tx: mpsc::UnboundedSender<AgentError>,
    failures_rx: AsyncMutex<mpsc::UnboundedReceiver<AgentError>>,
}

impl Drop for AgentInner {
    fn drop(&mut self) {
        for slot in self.behaviours.get_mut().drain() {
            slot.task.abort();
        }
        if let Some(consumer) = self.consumer.get_mut().take() {
            consumer.abort();
        }
    }
}

impl Agent {
    pub fn new(name: impl Into<String>, inbox: MailboxReceiver, outbox: MailboxSender) -> Self {
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(AgentInner {
                name: name.into(),
                inbox: Arc::new(AsyncMutex::new(inbox)),
                outbox,
                consumer: Mutex::new(None),
                handlers: RwLock::new(HandlerTable::default()),
                behaviours: Mutex::new(BehaviourTable::default()),
                failures_tx,
                failures_rx: AsyncMutex::new(failures_rx),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn outbox(&self) -> &MailboxSender {
        &self.inner.outbox
    }

    /// Starts a loop invoking `behaviour` with this agent until it is
    /// unregistered. Returns without waiting for any invocation.
    ///
    /// Registering the same `Arc` again restarts its loop under the same id,
    /// so one behaviour never has two loops.
    pub fn register_behaviour<B: Behaviour>(&self, behaviour: Arc<B>) -> Result<BehaviourId> {
        let identity = Identity::of::<B, B>(&behaviour);
        let runtime = Handle::try_current().map_err(|_| AgentError::NoRuntime)?;
        let behaviour: Arc<dyn Behaviour> = behaviour;

        let mut table = self.inner.behaviours.lock();
        let id = table.id_for(identity);
        let previous = table.remove(id).map(|slot| {
            slot.task.abort();
            slot.task
        });
        let restarted = previous.is_some();
        let task = runtime.spawn(behaviour_loop(
            Arc::downgrade(&self.inner),
            id,
            Arc::clone(&behaviour),
            previous,
        ));
        let name = behaviour.name().to_string();
        table.insert(
            id,
            BehaviourSlot {
                identity,
                behaviour,
                task,
            },
        );
        drop(table);

        if restarted {
            debug!(agent = %self.name(), behaviour = %name, %id, "behaviour restarted");
        } else {
            debug!(agent = %self.name(), behaviour = %name, %id, "behaviour registered");
        }
        Ok(id)
    }

    /// Removes the behaviour and aborts its loop. The abort lands at the
    /// loop's next suspension point. Returns `false` for unknown ids.
    pub fn unregister_behaviour(&self, id: BehaviourId) -> bool {
        let Some(slot) = self.inner.behaviours.lock().remove(id) else {
            return false;
        };
        slot.task.abort();
        debug!(agent = %self.name(), behaviour = %slot.behaviour.name(), %id, "behaviour unregistered");
        true
    }

    /// Like [`Agent::unregister_behaviour`], then waits until the loop has
    /// actually stopped.
    pub async fn unregister_behaviour_and_wait(&self, id: BehaviourId) -> Result<bool> {
        let Some(slot) = self.inner.behaviours.lock().remove(id) else {
            return Ok(false);
        };
        slot.task.abort();
        match slot.task.await {
            Ok(()) => {}
            Err(err) if err.is_cancelled() => {}
            Err(err) => return Err(anyhow::Error::new(err).into()),
        }
        debug!(agent = %self.name(), behaviour = %slot.behaviour.name(), %id, "behaviour stopped");
        Ok(true)
    }

    pub fn behaviour_id<B: Behaviour>(&self, behaviour: &Arc<B>) -> Option<BehaviourId> {
        self.inner
            .behaviours
            .lock()
            .find(Identity::of::<B, B>(behaviour))
    }

    /// True while the behaviour is registered and its loop has not ended.
    pub fn is_behaviour_active(&self, id: BehaviourId) -> bool {
        self.inner
            .behaviours
            .lock()
            .get(id)
            .is_some_and(|slot| !slot.task.is_finished())
    }

    pub fn behaviour_count(&self) -> usize {
        self.inner.behaviours.lock().len()
    }

    /// Adds `handler` for messages of kind `M`. Registering the same `Arc`
    /// for the same kind again returns the existing id.
    pub fn register_handler<M, H>(&self, handler: Arc<H>) -> HandlerId
    where
        M: MessageKind + ?Sized,
        H: MessageHandler<M>,
    {
        let identity = Identity::of::<H, M>(&handler);
        let name = handler.name().to_string();
        let dispatch: Arc<dyn Dispatch> = Arc::new(TypedDispatch::<M, H>::new(handler));
        let (id, added) = self.inner.handlers.write().insert(identity, dispatch);
        if added {
            debug!(agent = %self.name(), handler = %name, kind = M::kind_name(), %id, "handler registered");
        }
        id
    }

    /// Returns `false` for unknown ids.
    pub fn unregister_handler(&self, id: HandlerId) -> bool {
        let removed = self.inner.handlers.write().remove(id);
        if removed {
            debug!(agent = %self.name(), %id, "handler unregistered");
        }
        removed
    }

    pub fn handler_id<M, H>(&self, handler: &Arc<H>) -> Option<HandlerId>
    where
        M: MessageKind + ?Sized,
        H: MessageHandler<M>,
    {
        self.inner
            .handlers
            .read()
            .find(Identity::of::<H, M>(handler))
    }

    pub fn is_handler_registered(&self, id: HandlerId) -> bool {
        self.inner.handlers.read().contains(id)
    }

    pub fn handler_count(&self) -> usize {
        self.inner.handlers.read().len()
    }

    /// Enqueues `message` onto the outbox without waiting.
    pub fn emit_message<M: Message>(&self, message: M) -> Result<()> {
        self.emit(envelope(message))
    }

    pub fn emit(&self, message: Envelope) -> Result<()> {
        trace!(agent = %self.name(), kind = message.kind(), "emit");
        self.inner
            .outbox
            .send(message)
            .map_err(|_| AgentError::MailboxClosed {
                agent: self.inner.name.clone(),
            })
    }

    /// Consumes the inbox until every producer is gone, dispatching each
    /// message to the handlers registered when it was dequeued.
    ///
    /// A handler error ends the loop and is returned. Fails with
    /// [`AgentError::AlreadyConsuming`] while a `run` is active or a
    /// consumption left running by an earlier `run` is still going.
    pub async fn consume_messages(&self) -> Result<()> {
        let mut inbox = self.claim_inbox()?;
        self.consume(&mut inbox).await
    }

    /// Consumes the inbox while watching the behaviour loops. Resolves with
    /// the first handler or behaviour failure, or `Ok` once the inbox is
    /// closed.
    ///
    /// Consumption runs as its own task. A behaviour failure is returned
    /// without stopping it, so the inbox keeps being served and the next
    /// `run` resumes the same task. Cancelling the `run` future aborts it.
    ///
    /// Behaviour failures are queued per agent: one raised while no `run`
    /// is active, or a second one raised during the same `run`, is
    /// returned by the next call.
    pub async fn run(&self) -> Result<()> {
        let mut consumer = self.attach_consumer()?;
        let mut guard = AbortOnDrop(Some(consumer.abort_handle()));
        let mut failures = self.inner.failures_rx.lock().await;
        info!(agent = %self.name(), behaviours = self.behaviour_count(), handlers = self.handler_count(), "agent running");

        let stopped = tokio::select! {
            joined = &mut consumer => Stopped::Consumer(joined),
            Some(failure) = failures.recv() => Stopped::Behaviour(failure),
        };

        let result = match stopped {
            Stopped::Consumer(joined) => {
                joined.unwrap_or_else(|err| Err(anyhow::Error::new(err).into()))
            }
            Stopped::Behaviour(failure) => {
                guard.disarm();
                *self.inner.consumer.lock() = Some(consumer);
                Err(failure)
            }
        };

        match &result {
            Ok(()) => info!(agent = %self.name(), "agent inbox closed"),
            Err(err) => warn!(agent = %self.name(), error = %err, "agent stopped on failure"),
        }
        result
    }

    /// Resumes the consumption left by an earlier `run`, or claims the
    /// inbox and spawns a new one.
    fn attach_consumer(&self) -> Result<JoinHandle<Result<()>>> {
        if let Some(consumer) = self.inner.consumer.lock().take() {
            debug!(agent = %self.name(), "resuming consumption");
            return Ok(consumer);
        }
        let inbox = Arc::clone(&self.inner.inbox)
            .try_lock_owned()
            .map_err(|_| AgentError::AlreadyConsuming(self.inner.name.clone()))?;
        let runtime = Handle::try_current().map_err(|_| AgentError::NoRuntime)?;
        Ok(runtime.spawn(consume_loop(Arc::downgrade(&self.inner), inbox)))
    }

    fn claim_inbox(&self) -> Result<AsyncMutexGuard<'_, MailboxReceiver>> {
        self.inner
            .inbox
            .try_lock()
            .map_err(|_| AgentError::AlreadyConsuming(self.inner.name.clone()))
    }

    async fn consume(&self, inbox: &mut MailboxReceiver) -> Result<()> {
        while let Some(message) = inbox.recv().await {
            self.dispatch(message).await?;
        }
        Ok(())
    }

    async fn dispatch(&self, message: Envelope) -> Result<()> {
        let handlers = self.inner.handlers.read().snapshot();
        trace!(agent = %self.name(), kind = message.kind(), handlers = handlers.len(), "dispatch");

        for handler in handlers {
            match handler.dispatch(&message).await {
                Ok(true) => {}
                Ok(false) => trace!(
                    agent = %self.name(),
                    handler = %handler.name(),
                    accepts = handler.accepts(),
                    kind = message.kind(),
                    "handler skipped"
                ),
                Err(err) => {
                    error!(agent = %self.name(), handler = %handler.name(), error = %err, "handler failed");
                    return Err(err);
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.inner.name)
            .field("handlers", &self.handler_count())
            .field("behaviours", &self.behaviour_count())
            .finish()
    }
}

enum Stopped {
    Consumer(std::result::Result<Result<()>, JoinError>),
    Behaviour(AgentError),
}

struct AbortOnDrop(Option<AbortHandle>);

impl AbortOnDrop {
    fn disarm(&mut self) {
        self.0 = None;
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
        }
    }
}

async fn consume_loop(
    weak: Weak<AgentInner>,
    mut inbox: OwnedMutexGuard<MailboxReceiver>,
) -> Result<()> {
    while let Some(message) = inbox.recv().await {
        let Some(inner) = weak.upgrade() else {
            return Ok(());
        };
        Agent { inner }.dispatch(message).await?;
    }
    Ok(())
}

async fn behaviour_loop(
    weak: Weak<AgentInner>,
    id: BehaviourId,
    behaviour: Arc<dyn Behaviour>,
    previous: Option<JoinHandle<()>>,
) {
    // A restarted loop must not overlap the one it replaces.
    if let Some(previous) = previous {
        let _ = previous.await;
    }

    loop {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let agent = Agent { inner };

        if let Err(err) = behaviour.run(&agent).await {
            error!(agent = %agent.name(), behaviour = %behaviour.name(), %id, error = %err, "behaviour failed");
            let _ = agent.inner.failures_tx.send(err);
            return;
        }

        drop(agent);
        tokio::task::yield_now().await;
    }
}
