//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.
//!
//! # Topics
//!
//! Each vehicle stream gets its own [`Topic`] lane:
//!
//! | Topic | Direction | Traffic |
//! |---|---|---|
//! | [`Topic::CmdDrive`] | in | User wheel speed commands |
//! | [`Topic::Encoders`] | in | Measured wheel speeds |
//! | [`Topic::McuStatus`] | in | Controller status with error bitmask |
//! | [`Topic::MotorStatus`] | in | Per-wheel motor driver status/feedback arrivals |
//! | [`Topic::UserEstop`] | in | User estop button |
//! | [`Topic::SafeCmdDrive`] | out | Rate-limited (or zeroed) wheel speed commands |
//! | [`Topic::Ambience`] | out | Lights and beeper pattern |
//! | [`Topic::McuEstop`] | out | Estop assertion to the controller |
//! | [`Topic::Diagnostics`] | out | Periodic health snapshots |

use std::collections::HashMap;
use std::fmt;

use grizzly_types::{Event, MotionError};
use tokio::sync::broadcast;
use tracing::{trace, warn};

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    CmdDrive,
    Encoders,
    McuStatus,
    MotorStatus,
    UserEstop,
    SafeCmdDrive,
    Ambience,
    McuEstop,
    Diagnostics,
}

impl Topic {
    pub const ALL: [Topic; 9] = [
        Topic::CmdDrive,
        Topic::Encoders,
        Topic::McuStatus,
        Topic::MotorStatus,
        Topic::UserEstop,
        Topic::SafeCmdDrive,
        Topic::Ambience,
        Topic::McuEstop,
        Topic::Diagnostics,
    ];

    /// Conventional stream name, e.g. `"mcu/estop"`.
    pub fn name(self) -> &'static str {
        match self {
            Topic::CmdDrive => "cmd_drive",
            Topic::Encoders => "encoders",
            Topic::McuStatus => "mcu/status",
            Topic::MotorStatus => "motors/status",
            Topic::UserEstop => "estop",
            Topic::SafeCmdDrive => "safe_cmd_drive",
            Topic::Ambience => "mcu/ambience",
            Topic::McuEstop => "mcu/estop",
            Topic::Diagnostics => "diagnostics",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared event bus. Clone it cheaply – all clones share the same underlying
/// broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    senders: HashMap<Topic, broadcast::Sender<Event>>,
}

impl EventBus {
    /// Create a new bus with the given channel capacity.
    ///
    /// The `capacity` is applied to every topic channel independently.
    pub fn new(capacity: usize) -> Self {
        let senders = Topic::ALL
            .into_iter()
            .map(|topic| (topic, broadcast::channel(capacity).0))
            .collect();
        Self { senders }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of active receivers that were handed the event.
    /// Returns `Ok(0)` when no subscribers are currently listening on the
    /// topic (this is a normal condition, not an error).
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, MotionError> {
        let sender = self.topic_sender(topic)?;
        if sender.receiver_count() == 0 {
            trace!(%topic, "no subscribers, event dropped");
            return Ok(0);
        }
        // Receivers can drop between the count and the send.
        Ok(sender.send(event).unwrap_or(0))
    }

    /// Subscribe to a specific [`Topic`] channel.
    ///
    /// The returned [`TopicReceiver`] yields only events published to that
    /// topic after this call.
    pub fn subscribe_to(&self, topic: Topic) -> Result<TopicReceiver, MotionError> {
        Ok(TopicReceiver {
            topic,
            receiver: self.topic_sender(topic)?.subscribe(),
        })
    }

    fn topic_sender(&self, topic: Topic) -> Result<&broadcast::Sender<Event>, MotionError> {
        self.senders
            .get(&topic)
            .ok_or_else(|| MotionError::Channel(format!("unknown topic {topic}")))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Topic-based receiver
// ---------------------------------------------------------------------------

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// A subscriber that fell behind skips the dropped events with a warning
    /// and keeps going; only the newest value of each stream matters here.
    /// Returns `None` once the bus has shut down.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of [`TopicReceiver::recv`].  Returns `None` when
    /// nothing is queued.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!(topic = %self.topic, lagged_by = n, "subscriber lagged");
                    continue;
                }
                Err(_) => return None,
            }
        }
    }

    /// The [`Topic`] this receiver is bound to.
    pub fn topic(&self) -> Topic {
        self.topic
    }
}
