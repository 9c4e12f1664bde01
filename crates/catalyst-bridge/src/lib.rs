//! The Messaging Bridge: a chat-service client plus the inbound
//! classification, intake, question-answering, and suspension-reply
//! routing built on top of it (spec 4.3).
//!
//! Built around a narrow async-trait transport seam (`ChatTransport`)
//! so the classification, intake, and question-answering logic never
//! touches an HTTP client directly, and on `catalyst-core::config::SlackConfig`
//! for the per-project configuration shape this crate consumes.

pub mod classify;
pub mod identity;
pub mod intake;
pub mod notifier;
pub mod poller;
pub mod qa;
pub mod suspension_bridge;
pub mod transport;

pub use classify::{classify_inbound, Classification};
pub use identity::{AgentIdentity, ChannelSet};
pub use notifier::SlackNotifier;
pub use transport::{ChatTransport, InboundMessage, SlackTransport};
