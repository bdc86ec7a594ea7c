//! Cross-tab change notification.
//!
//! Every tab on a store holds a receiver on one [`SignalChannel`]. A mutation
//! publishes a [`SyncSignal`]; other tabs coalesce bursts of signals through a
//! [`Debouncer`] and run one bootstrap when the burst goes quiet.

use tokio::sync::broadcast::{self, error::TryRecvError};

use tabsync_core::{ContextId, SyncSignal};

/// Fan-out of sync signals to every subscribed tab, the publisher included.
#[derive(Debug, Clone)]
pub struct SignalChannel {
    sender: broadcast::Sender<SyncSignal>,
}

impl SignalChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Returns the number of receivers the signal reached. Having none is
    /// not an error: the signal is also persisted in the store slot.
    pub fn publish(&self, signal: &SyncSignal) -> usize {
        self.sender.send(signal.clone()).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncSignal> {
        self.sender.subscribe()
    }
}

/// A cancel-and-reschedule timer: every trigger pushes the deadline out to
/// `at + window`; it fires at most once per quiet period. The deadline never
/// moves earlier.
#[derive(Debug, Clone)]
pub struct Debouncer {
    window_ms: u64,
    deadline: Option<u64>,
}

impl Debouncer {
    pub fn new(window_ms: u64) -> Self {
        Self {
            window_ms,
            deadline: None,
        }
    }

    pub fn trigger(&mut self, at_ms: u64) {
        let deadline = at_ms.saturating_add(self.window_ms);
        self.deadline = Some(self.deadline.map_or(deadline, |d| d.max(deadline)));
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline
    }

    /// True exactly once when the deadline has passed; disarms.
    pub fn fire_if_due(&mut self, now_ms: u64) -> bool {
        match self.deadline {
            Some(deadline) if now_ms >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

/// One tab's end of the channel.
pub struct SignalListener {
    own: ContextId,
    receiver: broadcast::Receiver<SyncSignal>,
    debouncer: Debouncer,
}

impl SignalListener {
    pub fn new(own: ContextId, channel: &SignalChannel, window_ms: u64) -> Self {
        Self {
            own,
            receiver: channel.subscribe(),
            debouncer: Debouncer::new(window_ms),
        }
    }

    /// Drain everything waiting on the channel. Each signal from another tab
    /// re-arms the debouncer from the moment it was sent; our own signals are
    /// dropped. Returns how many foreign signals were seen.
    pub fn pump(&mut self, now_ms: u64) -> usize {
        let mut foreign = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(signal) => {
                    if signal.origin == self.own {
                        continue;
                    }
                    log::debug!("signal {} from {}", signal.kind, signal.origin);
                    foreign += 1;
                    self.debouncer.trigger(signal.at.min(now_ms));
                }
                Err(TryRecvError::Lagged(n)) => {
                    // Missed signals may have come from anyone.
                    log::warn!("signal listener lagged by {n} messages");
                    foreign += 1;
                    self.debouncer.trigger(now_ms);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
        foreign
    }

    /// A raw change event on the store's signal slot. A payload that does not
    /// parse is treated as foreign.
    pub fn on_raw_signal(&mut self, new_value: Option<&str>, now_ms: u64) -> bool {
        let parsed = new_value.and_then(|raw| serde_json::from_str::<SyncSignal>(raw).ok());
        match parsed {
            Some(signal) if signal.origin == self.own => false,
            _ => {
                self.debouncer.trigger(now_ms);
                true
            }
        }
    }

    pub fn take_due(&mut self, now_ms: u64) -> bool {
        self.debouncer.fire_if_due(now_ms)
    }

    pub fn debouncer(&self) -> &Debouncer {
        &self.debouncer
    }
}
