//! Chat client: HTTP bindings, per-conversation state and the controller
//! tying them together.

pub mod api;
pub mod controller;
pub mod session;

pub use api::{ApiClient, ClientError, Utf8Decoder};
pub use controller::{ChatController, ControllerError, Notifier, TracingNotifier, TurnOutcome};
pub use session::{ChatSession, ChatState, SessionError};
