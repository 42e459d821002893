// 消息类型模块

mod text;

use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub use text::TextMessage;

/// Immutable text-bearing value carried through mailboxes.
///
/// Concrete kinds differ only by type identity; none of them adds fields.
/// Declare new kinds with [`message_kind!`](crate::message_kind).
pub trait Message: fmt::Debug + fmt::Display + Send + Sync + 'static {
    fn content(&self) -> &str;

    /// Nominal kind name, used for logging.
    fn kind(&self) -> &'static str;

    fn as_any(&self) -> &dyn Any;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// Mailbox item. Shared so one message can be observed by every handler.
pub type Envelope = Arc<dyn Message>;

pub fn envelope<M: Message>(message: M) -> Envelope {
    Arc::new(message)
}

/// Selects the messages a handler accepts.
///
/// `dyn Message` accepts every kind. A concrete kind accepts only envelopes
/// whose runtime type is exactly that kind.
pub trait MessageKind: Send + Sync + 'static {
    fn select(envelope: &Envelope) -> Option<Arc<Self>>;

    fn kind_name() -> &'static str;
}

impl MessageKind for dyn Message {
    fn select(envelope: &Envelope) -> Option<Arc<Self>> {
        Some(Arc::clone(envelope))
    }

    fn kind_name() -> &'static str {
        "Message"
    }
}

pub fn downcast<K: Message>(envelope: &Envelope) -> Option<Arc<K>> {
    if !envelope.as_any().is::<K>() {
        return None;
    }
    Arc::clone(envelope).into_any().downcast::<K>().ok()
}

/// Declares a message kind: a struct holding only `content`, with
/// `Display`/equality by content and the [`Message`] and [`MessageKind`]
/// impls wired up.
///
/// ```
/// autogents::message_kind! {
///     /// Periodic wake-up signal.
///     pub Alarm
/// }
///
/// let alarm = Alarm::new("wake up");
/// assert_eq!(alarm.to_string(), "wake up");
/// ```
#[macro_export]
macro_rules! message_kind {
    ($(#[$meta:meta])* $vis:vis $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        $vis struct $name {
            content: ::std::string::String,
        }

        impl $name {
            pub fn new(content: impl Into<::std::string::String>) -> Self {
                Self {
                    content: content.into(),
                }
            }

            pub fn content(&self) -> &str {
                &self.content
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(&self.content)
            }
        }

        impl $crate::message::Message for $name {
            fn content(&self) -> &str {
                &self.content
            }

            fn kind(&self) -> &'static str {
                stringify!($name)
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(
                self: ::std::sync::Arc<Self>,
            ) -> ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> {
                self
            }
        }

        impl $crate::message::MessageKind for $name {
            fn select(
                envelope: &$crate::message::Envelope,
            ) -> ::std::option::Option<::std::sync::Arc<Self>> {
                $crate::message::downcast::<Self>(envelope)
            }

            fn kind_name() -> &'static str {
                stringify!($name)
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    crate::message_kind! {
        Ping
    }

    crate::message_kind! {
        Pong
    }

    #[test]
    fn base_kind_selects_every_message() {
        let ping = envelope(Ping::new("p"));
        let pong = envelope(Pong::new("q"));

        assert_eq!(<dyn Message>::select(&ping).unwrap().content(), "p");
        assert_eq!(<dyn Message>::select(&pong).unwrap().content(), "q");
    }

    #[test]
    fn concrete_kind_selects_exact_type_only() {
        let ping = envelope(Ping::new("p"));

        let selected = Ping::select(&ping).expect("ping selects ping");
        assert_eq!(*selected, Ping::new("p"));
        assert!(Pong::select(&ping).is_none());
        assert!(TextMessage::select(&ping).is_none());
    }

    #[test]
    fn kind_names_follow_type_names() {
        assert_eq!(Ping::kind_name(), "Ping");
        assert_eq!(<dyn Message>::kind_name(), "Message");
        assert_eq!(envelope(Pong::new("")).kind(), "Pong");
    }
}
