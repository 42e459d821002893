use std::any::TypeId;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use tokio::task::JoinHandle;

use super::behaviour::Behaviour;
use super::handler::Dispatch;

/// Stable handle returned by behaviour registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BehaviourId(u64);

/// Stable handle returned by handler registration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(u64);

impl fmt::Display for BehaviourId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "behaviour-{}", self.0)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

/// Identity of a registered callable: the address of its `Arc` allocation
/// plus the type it was registered as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Identity {
    addr: usize,
    type_id: TypeId,
}

impl Identity {
    pub(crate) fn of<T: ?Sized + 'static, K: ?Sized + 'static>(value: &Arc<T>) -> Self {
        Self {
            addr: Arc::as_ptr(value) as *const () as usize,
            type_id: TypeId::of::<K>(),
        }
    }
}

struct HandlerEntry {
    identity: Identity,
    dispatch: Arc<dyn Dispatch>,
}

/// Registered handlers, iterated in registration order.
#[derive(Default)]
pub(crate) struct HandlerTable {
    next_id: u64,
    entries: BTreeMap<HandlerId, HandlerEntry>,
}

impl HandlerTable {
    /// Returns the id and whether a new entry was added. Re-inserting an
    /// identity already present keeps the existing entry.
    pub(crate) fn insert(
        &mut self,
        identity: Identity,
        dispatch: Arc<dyn Dispatch>,
    ) -> (HandlerId, bool) {
        if let Some(id) = self.find(identity) {
            return (id, false);
        }
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.entries.insert(id, HandlerEntry { identity, dispatch });
        (id, true)
    }

    pub(crate) fn find(&self, identity: Identity) -> Option<HandlerId> {
        self.entries
            .iter()
            .find(|(_, entry)| entry.identity == identity)
            .map(|(id, _)| *id)
    }

    pub(crate) fn remove(&mut self, id: HandlerId) -> bool {
        self.entries.remove(&id).is_some()
    }

    pub(crate) fn contains(&self, id: HandlerId) -> bool {
        self.entries.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Handlers active right now; later registrations do not affect it.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Dispatch>> {
        self.entries
            .values()
            .map(|entry| Arc::clone(&entry.dispatch))
            .collect()
    }
}

pub(crate) struct BehaviourSlot {
    pub(crate) identity: Identity,
    pub(crate) behaviour: Arc<dyn Behaviour>,
    pub(crate) task: JoinHandle<()>,
}

/// Active behaviours and the loop task running each of them.
#[derive(Default)]
pub(crate) struct BehaviourTable {
    next_id: u64,
    slots: BTreeMap<BehaviourId, BehaviourSlot>,
}

impl BehaviourTable {
    /// Id already used for `identity`, or a fresh one.
    pub(crate) fn id_for(&mut self, identity: Identity) -> BehaviourId {
        if let Some(id) = self.find(identity) {
            return id;
        }
        self.next_id += 1;
        BehaviourId(self.next_id)
    }

    pub(crate) fn find(&self, identity: Identity) -> Option<BehaviourId> {
        self.slots
            .iter()
            .find(|(_, slot)| slot.identity == identity)
            .map(|(id, _)| *id)
    }

    pub(crate) fn insert(&mut self, id: BehaviourId, slot: BehaviourSlot) {
        self.slots.insert(id, slot);
    }

    pub(crate) fn remove(&mut self, id: BehaviourId) -> Option<BehaviourSlot> {
        self.slots.remove(&id)
    }

    pub(crate) fn get(&self, id: BehaviourId) -> Option<&BehaviourSlot> {
        self.slots.get(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = BehaviourSlot> + '_ {
        std::mem::take(&mut self.slots).into_values()
    }
}
