pub mod internal;

pub use internal::{Conversation, IssuedSession, Message, Role, User};
