//! [`LatestObservation`] – single-slot holder for the newest value of a stream.
//!
//! Each inbound stream keeps only its most recent message.  A new arrival
//! replaces the previous one wholesale; readers get a shared reference to the
//! stored snapshot.

use grizzly_types::Timestamp;

/// A value together with the time it was received.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed<T> {
    pub value: T,
    pub received_at: Timestamp,
}

/// Latest-value cell.  Empty until the first [`LatestObservation::update`].
///
/// ```
/// use chrono::Utc;
/// use grizzly_kernel::latest::LatestObservation;
///
/// let mut cell = LatestObservation::new();
/// assert!(cell.value().is_none());
///
/// cell.update(3, Utc::now());
/// cell.update(7, Utc::now());
/// assert_eq!(cell.value(), Some(&7));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct LatestObservation<T> {
    slot: Option<Observed<T>>,
}

impl<T> Default for LatestObservation<T> {
    fn default() -> Self {
        Self { slot: None }
    }
}

impl<T> LatestObservation<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored value.
    pub fn update(&mut self, value: T, received_at: Timestamp) {
        self.slot = Some(Observed { value, received_at });
    }

    pub fn value(&self) -> Option<&T> {
        self.slot.as_ref().map(|observed| &observed.value)
    }

    /// When the stored value arrived.
    pub fn received_at(&self) -> Option<Timestamp> {
        self.slot.as_ref().map(|observed| observed.received_at)
    }
}
