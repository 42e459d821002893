crate::message_kind! {
    /// Built-in base kind: plain text with no further tag.
    pub TextMessage
}

impl From<&str> for TextMessage {
    fn from(content: &str) -> Self {
        TextMessage::new(content)
    }
}

impl From<String> for TextMessage {
    fn from(content: String) -> Self {
        TextMessage::new(content)
    }
}
