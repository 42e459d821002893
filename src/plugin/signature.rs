use std::any::{type_name, TypeId};
use std::fmt;

use crate::agent::Agent;
use crate::error::{AgentError, RegistrationKind, Result};
use crate::message::{Envelope, MessageKind};

/// Runtime description of a parameter type.
#[derive(Clone, Copy)]
pub struct TypeTag {
    id: TypeId,
    name: &'static str,
    selector: Option<fn(&Envelope) -> bool>,
}

impl TypeTag {
    /// Tag for an arbitrary type. Never counts as a message kind.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            selector: None,
        }
    }

    /// Tag for a message kind; `TypeTag::message::<dyn Message>()` is the
    /// base kind.
    pub fn message<K: MessageKind + ?Sized>() -> Self {
        Self {
            id: TypeId::of::<K>(),
            name: K::kind_name(),
            selector: Some(selects::<K>),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub fn is_message_kind(&self) -> bool {
        self.selector.is_some()
    }

    /// Whether a message kind tag accepts this envelope. Non-message tags
    /// accept nothing.
    pub fn accepts(&self, message: &Envelope) -> bool {
        self.selector.is_some_and(|select| select(message))
    }
}

fn selects<K: MessageKind + ?Sized>(message: &Envelope) -> bool {
    K::select(message).is_some()
}

impl PartialEq for TypeTag {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeTag {}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeTag")
            .field("name", &self.name)
            .field("message_kind", &self.is_message_kind())
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Param {
    pub name: String,
    pub annotation: Option<TypeTag>,
}

impl Param {
    pub fn typed<T: ?Sized + 'static>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: Some(TypeTag::of::<T>()),
        }
    }

    pub fn message<K: MessageKind + ?Sized>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: Some(TypeTag::message::<K>()),
        }
    }

    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            annotation: None,
        }
    }
}

/// Declared parameter list of a dynamically supplied callable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<Param>,
}

impl Signature {
    pub fn new(params: Vec<Param>) -> Self {
        Self { params }
    }

    pub fn unary(param: Param) -> Self {
        Self {
            params: vec![param],
        }
    }

    /// Signature `(agent: Agent)`.
    pub fn behaviour() -> Self {
        Self::unary(Param::typed::<Agent>("agent"))
    }

    /// Signature `(message: K)`.
    pub fn handler<K: MessageKind + ?Sized>() -> Self {
        Self::unary(Param::message::<K>("message"))
    }

    fn single_annotation(&self, kind: RegistrationKind, name: &str) -> Result<TypeTag> {
        let [param] = self.params.as_slice() else {
            return Err(AgentError::invalid_registration(
                kind,
                name,
                format!("expected exactly one parameter, found {}", self.params.len()),
            ));
        };
        param.annotation.ok_or_else(|| {
            AgentError::invalid_registration(
                kind,
                name,
                format!("parameter `{}` has no type annotation", param.name),
            )
        })
    }
}

/// Accepts exactly one annotated parameter of type [`Agent`].
pub fn validate_behaviour_signature(name: &str, signature: &Signature) -> Result<()> {
    let tag = signature.single_annotation(RegistrationKind::Behaviour, name)?;
    if !tag.is::<Agent>() {
        return Err(AgentError::invalid_registration(
            RegistrationKind::Behaviour,
            name,
            format!("parameter must be `Agent`, found `{}`", tag.name()),
        ));
    }
    Ok(())
}

/// Accepts exactly one annotated parameter whose type is a message kind.
/// Returns that kind's tag.
pub fn validate_handler_signature(name: &str, signature: &Signature) -> Result<TypeTag> {
    let tag = signature.single_annotation(RegistrationKind::Handler, name)?;
    if !tag.is_message_kind() {
        return Err(AgentError::invalid_registration(
            RegistrationKind::Handler,
            name,
            format!("parameter must be a message kind, found `{}`", tag.name()),
        ));
    }
    Ok(tag)
}
