//! `grizzly-middleware` – The Nervous System
//!
//! Routes vehicle streams between drivers, the safety node, and any other
//! in-process listener without caring about the data's meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, typed, topic-based publish/subscribe event bus built
//!   on Tokio broadcast channels.

pub mod bus;

pub use bus::{EventBus, Topic, TopicReceiver};
