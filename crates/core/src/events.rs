//! Typed event subscription registry
//!
//! Components that produce events (peer connections, data channels, the
//! connection harness) own an [`EventRegistry`] for their event enum.
//! Consumers subscribe to one or more event kinds and receive matching
//! events, in emission order, on an unbounded channel.
//!
//! A registry created with [`EventRegistry::buffered`] holds on to events
//! nobody was subscribed to and replays them to the first matching
//! subscriber. Transports use this for events that can fire before the
//! consumer had a chance to subscribe, such as a data channel opening.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use tokio::sync::mpsc;

/// An event enum whose variants are identified by a kind tag
pub trait TaggedEvent: Clone + Send + 'static {
    type Kind: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Identifier returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Subscriber<E: TaggedEvent> {
    id: SubscriptionId,
    /// `None` receives every kind
    kinds: Option<HashSet<E::Kind>>,
    tx: mpsc::UnboundedSender<E>,
}

impl<E: TaggedEvent> Subscriber<E> {
    fn wants(&self, kind: &E::Kind) -> bool {
        self.kinds.as_ref().map_or(true, |k| k.contains(kind))
    }
}

/// Upper bound on events held for late subscribers
const MAX_PENDING: usize = 1024;

struct RegistryInner<E: TaggedEvent> {
    next_id: u64,
    subscribers: Vec<Subscriber<E>>,
    /// `Some` when undelivered events are kept for replay
    pending: Option<VecDeque<E>>,
}

/// Registry dispatching events to subscribers by kind
///
/// # Example
///
/// ```
/// use rtcscan_core::peer::{ChannelEvent, ChannelEventKind};
/// use rtcscan_core::EventRegistry;
///
/// # tokio_test::block_on(async {
/// let registry = EventRegistry::buffered();
/// registry.emit(ChannelEvent::Open);
///
/// // Emitted before anyone listened, replayed on subscribe
/// let mut opens = registry.subscribe(ChannelEventKind::Open);
/// assert_eq!(opens.recv().await, Some(ChannelEvent::Open));
/// # });
/// ```
pub struct EventRegistry<E: TaggedEvent> {
    inner: Mutex<RegistryInner<E>>,
}

impl<E: TaggedEvent> Default for EventRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TaggedEvent> EventRegistry<E> {
    /// Registry that drops events nobody subscribed to
    pub fn new() -> Self {
        Self::with_pending(None)
    }

    /// Registry that replays undelivered events to later subscribers
    pub fn buffered() -> Self {
        Self::with_pending(Some(VecDeque::new()))
    }

    fn with_pending(pending: Option<VecDeque<E>>) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                next_id: 0,
                subscribers: Vec::new(),
                pending,
            }),
        }
    }

    /// Subscribe to a single event kind
    pub fn subscribe(&self, kind: E::Kind) -> Subscription<E> {
        self.add(Some(HashSet::from([kind])))
    }

    /// Subscribe to several event kinds on one channel
    pub fn subscribe_many(&self, kinds: &[E::Kind]) -> Subscription<E> {
        self.add(Some(kinds.iter().copied().collect()))
    }

    /// Subscribe to every event
    pub fn subscribe_all(&self) -> Subscription<E> {
        self.add(None)
    }

    fn add(&self, kinds: Option<HashSet<E::Kind>>) -> Subscription<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.inner.lock();
        let id = SubscriptionId(inner.next_id);
        inner.next_id += 1;
        let subscriber = Subscriber { id, kinds, tx };

        if let Some(pending) = inner.pending.as_mut() {
            let mut kept = VecDeque::with_capacity(pending.len());
            for event in pending.drain(..) {
                if subscriber.wants(&event.kind()) {
                    let _ = subscriber.tx.send(event);
                } else {
                    kept.push_back(event);
                }
            }
            *pending = kept;
        }

        inner.subscribers.push(subscriber);
        Subscription { id, rx }
    }

    /// Remove a subscription. Unknown ids are ignored.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.inner.lock().subscribers.retain(|s| s.id != id);
    }

    /// Deliver an event to every subscriber of its kind.
    ///
    /// Subscribers whose receiver was dropped are pruned. On a buffered
    /// registry an event no one received is queued for replay.
    ///
    /// # Returns
    /// The number of subscribers the event was delivered to
    pub fn emit(&self, event: E) -> usize {
        let kind = event.kind();
        let mut inner = self.inner.lock();
        let mut delivered = 0;
        inner.subscribers.retain(|s| {
            if !s.wants(&kind) {
                return !s.tx.is_closed();
            }
            match s.tx.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        if delivered == 0 {
            match inner.pending.as_mut() {
                Some(pending) if pending.len() < MAX_PENDING => pending.push_back(event),
                _ => tracing::trace!(?kind, "Event dropped, no subscriber"),
            }
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Drop all subscribers; their receivers see the end of the stream
    pub fn clear(&self) {
        self.inner.lock().subscribers.clear();
    }
}

/// Receiving end of a subscription
pub struct Subscription<E> {
    id: SubscriptionId,
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E> Subscription<E> {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Next event, `None` once the registry dropped this subscription
    pub async fn recv(&mut self) -> Option<E> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<E> {
        self.rx.try_recv().ok()
    }
}
