//! Chat message primitive passed to the text-generation capability.

use serde::{Deserialize, Serialize};

/// A single message in a generation prompt, with a role and text content.
///
/// The answer generator builds two-message prompts (system instructions plus
/// a user turn embedding the retrieved context); providers may accept longer
/// conversations through the same type.
///
/// # Examples
///
/// ```
/// use ragloom::message::Message;
///
/// let system = Message::system("You answer strictly from the given context.");
/// let user = Message::user("What are the Nazca Lines?");
/// assert_eq!(system.role, Message::SYSTEM);
/// assert_eq!(user.role, Message::USER);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Role of the sender: "system", "user", or "assistant".
    pub role: String,
    /// Text content of the message.
    pub content: String,
}

impl Message {
    /// User input message role.
    pub const USER: &'static str = "user";
    /// Model response message role.
    pub const ASSISTANT: &'static str = "assistant";
    /// System instruction message role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a message with an explicit role.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    /// Creates a user message.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant message.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system message.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }
}
