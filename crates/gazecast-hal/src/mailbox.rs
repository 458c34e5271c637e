//! [`SampleMailbox`] – single-slot, last-write-wins sample latch.
//!
//! The driver delivers samples from its own execution context; the tick loop
//! reads at frame rate.  Only the newest sample matters for focus, so the
//! mailbox holds exactly one: every [`post`][SampleMailbox::post]
//! overwrites, every [`take`][SampleMailbox::take] empties.
//!
//! Per-tick reads never wait.  If the writer happens to hold the slot at
//! the instant of a [`take`][SampleMailbox::take] or
//! [`has_pending`][SampleMailbox::has_pending], the tick sees "no new
//! sample" and the sample is picked up on the next tick.
//!
//! [`clear`][SampleMailbox::clear] runs only on transport failure and
//! close, and must leave the slot empty, so it waits for a concurrent
//! [`post`][SampleMailbox::post].  The writer holds the slot for a single
//! `Option` replace, which bounds that wait.

use std::sync::atomic::{AtomicU64, Ordering};

use gazecast_types::RawGazeSample;
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct SampleMailbox {
    slot: Mutex<Option<RawGazeSample>>,
    /// Samples replaced before anyone read them.
    overwritten: AtomicU64,
}

impl SampleMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latch `sample`, replacing any unread one.
    pub fn post(&self, sample: RawGazeSample) {
        let previous = self.slot.lock().replace(sample);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Remove and return the latched sample, if any.  Never blocks.
    pub fn take(&self) -> Option<RawGazeSample> {
        self.slot.try_lock().and_then(|mut slot| slot.take())
    }

    /// Drop any unread sample.  Waits out an in-flight `post`.
    pub fn clear(&self) {
        self.slot.lock().take();
    }

    /// `true` when an unread sample is latched.  Never blocks; reports
    /// `false` while a `post` is in flight.
    pub fn has_pending(&self) -> bool {
        self.slot.try_lock().is_some_and(|slot| slot.is_some())
    }

    /// Total samples discarded because a newer one arrived first.
    pub fn overwritten_count(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}
