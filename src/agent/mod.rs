// Agent 运行时模块

mod agent;
mod behaviour;
mod handler;
mod registry;

pub use agent::Agent;
pub use behaviour::{behaviour_fn, Behaviour, FnBehaviour};
pub use handler::{handler_fn, FnHandler, MessageHandler};
pub use registry::{BehaviourId, HandlerId};
