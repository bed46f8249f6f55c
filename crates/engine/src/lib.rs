use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender, unbounded};
use render_protocol::{CardId, RenderState, RendererEvent, RendererMsg};
use rtrb::{Consumer, Producer, PushError, RingBuffer};
use smallvec::SmallVec;

/// Main-thread half: sends commands, drains renderer events.
pub struct MainThreadChannels {
    pub command_sender: Sender<RendererMsg>,
    pub event_consumer: MainEventConsumer,
}

/// Background half: receives commands, reports events. `command_sender` is a
/// loopback clone handed to helper threads (watermark loaders) so their
/// results enter the same FIFO as everything else.
pub struct RendererThreadChannels {
    pub command_receiver: Receiver<RendererMsg>,
    pub command_sender: Sender<RendererMsg>,
    pub event_producer: RendererEventProducer,
}

/// Builds both halves of the main/renderer link.
///
/// # Panics
///
/// `event_capacity` must be greater than zero; the event ring cannot hold
/// `Ready` otherwise.
pub fn create_thread_channels(event_capacity: usize) -> (MainThreadChannels, RendererThreadChannels) {
    assert!(event_capacity > 0, "event capacity must be greater than zero");

    let (command_sender, command_receiver) = unbounded();
    let (event_producer, event_consumer) = RingBuffer::new(event_capacity);

    let main_thread_channels = MainThreadChannels {
        command_sender: command_sender.clone(),
        event_consumer: MainEventConsumer {
            consumer: event_consumer,
            _not_clone: PhantomData,
        },
    };
    let renderer_thread_channels = RendererThreadChannels {
        command_receiver,
        command_sender,
        event_producer: RendererEventProducer {
            producer: event_producer,
            dropped_acks: 0,
            _not_clone: PhantomData,
        },
    };

    (main_thread_channels, renderer_thread_channels)
}

// The event ring is single-producer, single-consumer. Neither wrapper is
// Clone, so a second producer or consumer cannot be created by accident.
pub struct RendererEventProducer {
    producer: Producer<RendererEvent>,
    dropped_acks: u64,
    _not_clone: PhantomData<fn()>,
}

impl RendererEventProducer {
    /// Readiness must reach the main thread; it is the first event pushed, so
    /// the ring has room unless it was sized to zero slots.
    pub fn push_ready(&mut self) {
        if let Err(PushError::Full(_)) = self.producer.push(RendererEvent::Ready) {
            tracing::error!("renderer event ring full, ready signal lost");
        }
    }

    /// Acknowledgements are instrumentation only and are dropped when the
    /// main thread is not draining.
    pub fn push_rendered(&mut self, card_id: CardId, timestamp: Instant) -> bool {
        match self
            .producer
            .push(RendererEvent::Rendered { card_id, timestamp })
        {
            Ok(()) => true,
            Err(PushError::Full(_)) => {
                self.dropped_acks += 1;
                false
            }
        }
    }

    pub fn dropped_acks(&self) -> u64 {
        self.dropped_acks
    }

    pub fn is_abandoned(&self) -> bool {
        self.producer.is_abandoned()
    }
}

pub struct MainEventConsumer {
    consumer: Consumer<RendererEvent>,
    _not_clone: PhantomData<fn()>,
}

impl MainEventConsumer {
    pub fn pop(&mut self) -> Option<RendererEvent> {
        self.consumer.pop().ok()
    }

    /// Appends every queued event to `output`; does not clear it.
    pub fn drain_into(&mut self, output: &mut Vec<RendererEvent>) {
        while let Ok(event) = self.consumer.pop() {
            output.push(event);
        }
    }

    /// The renderer thread has gone away and dropped its producer.
    pub fn is_abandoned(&self) -> bool {
        self.consumer.is_abandoned()
    }
}

/// Identity used to collapse mailbox entries.
pub trait MailboxKey {
    type Key: Eq + Hash + Clone;

    fn mailbox_key(&self) -> Self::Key;
}

impl MailboxKey for RenderState {
    type Key = CardId;

    fn mailbox_key(&self) -> Self::Key {
        self.card_id.clone()
    }
}

/// Holds at most one value per key: a newer value replaces the older one in
/// place, so drain order is first-insertion order and no history is kept.
pub struct LatestValueMailbox<T: MailboxKey> {
    slots: HashMap<T::Key, usize>,
    values: Vec<T>,
}

impl<T: MailboxKey> Default for LatestValueMailbox<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            values: Vec::new(),
        }
    }
}

impl<T: MailboxKey> LatestValueMailbox<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the key was not already waiting.
    pub fn insert(&mut self, value: T) -> bool {
        let key = value.mailbox_key();
        match self.slots.get(&key) {
            Some(&slot) => {
                self.values[slot] = value;
                false
            }
            None => {
                self.slots.insert(key, self.values.len());
                self.values.push(value);
                true
            }
        }
    }

    pub fn remove(&mut self, key: &T::Key) -> Option<T> {
        let slot = self.slots.remove(key)?;
        let value = self.values.remove(slot);
        for index in self.slots.values_mut() {
            if *index > slot {
                *index -= 1;
            }
        }
        Some(value)
    }

    pub fn get(&self, key: &T::Key) -> Option<&T> {
        self.slots.get(key).map(|slot| &self.values[*slot])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn drain(&mut self) -> SmallVec<[T; 4]> {
        self.slots.clear();
        self.values.drain(..).collect()
    }
}
