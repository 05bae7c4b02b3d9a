//! Single-threaded listener registry
//!
//! Components never call into each other from inside an event handler.
//! Instead, every registration belongs to an [`Owner`], `emit()` appends the
//! event to the mailbox of each owner with a matching registration, and the
//! owner later drains its mailbox and dispatches on the [`ListenerId`] it got
//! back when registering.
//!
//! This keeps the catch-all ("observe everything, filter centrally") style of
//! a dynamic event bus while making every registration an explicit value that
//! can be counted and reversed:
//! - `off(id)` removes exactly one registration
//! - `off_owner(owner)` removes everything one component installed
//! - `off_topic(topic)` removes the registrations for one event kind
//! - `clear()` removes everything
//!
//! Removing a registration also discards its undelivered events, so events
//! emitted by a provider that has since been released are never observed.
//! A mailbox holds at most [`MAX_MAILBOX_LEN`] deliveries; past that the
//! oldest are dropped.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Undelivered events kept per owner before the oldest are dropped
pub const MAX_MAILBOX_LEN: usize = 4096;

/// An event that can be routed by kind
pub trait Event: Clone + fmt::Debug {
    /// Discriminant used for topic matching
    type Kind: Clone + PartialEq + fmt::Debug;

    /// Kind of this event
    fn kind(&self) -> Self::Kind;
}

/// What a registration listens to
#[derive(Debug, Clone, PartialEq)]
pub enum Topic<K> {
    /// Every event (wildcard)
    All,

    /// Only events of one kind
    Only(K),
}

impl<K: PartialEq> Topic<K> {
    /// Check whether an event kind is selected by this topic
    pub fn matches(&self, kind: &K) -> bool {
        match self {
            Topic::All => true,
            Topic::Only(k) => k == kind,
        }
    }
}

/// Identity of a component holding registrations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner(u64);

impl Owner {
    /// Allocate a process-unique owner identity
    pub fn next() -> Self {
        static NEXT_OWNER: AtomicU64 = AtomicU64::new(1);
        Owner(NEXT_OWNER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Handle for a single registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

#[derive(Debug)]
struct Registration<K> {
    id: ListenerId,
    owner: Owner,
    topic: Topic<K>,
    once: bool,
}

struct Registry<E: Event> {
    next_id: u64,
    registrations: Vec<Registration<E::Kind>>,
    mailboxes: HashMap<Owner, VecDeque<(ListenerId, E)>>,
}

impl<E: Event> Registry<E> {
    fn register(&mut self, owner: Owner, topic: Topic<E::Kind>, once: bool) -> ListenerId {
        self.next_id += 1;
        let id = ListenerId(self.next_id);
        self.registrations.push(Registration {
            id,
            owner,
            topic,
            once,
        });
        id
    }

    /// Remove registrations selected by `pred` along with their pending deliveries
    fn remove_where(&mut self, pred: impl Fn(&Registration<E::Kind>) -> bool) -> usize {
        let mut removed = Vec::new();
        self.registrations.retain(|r| {
            if pred(r) {
                removed.push((r.owner, r.id));
                false
            } else {
                true
            }
        });

        for (owner, id) in &removed {
            if let Some(mailbox) = self.mailboxes.get_mut(owner) {
                mailbox.retain(|(listener, _)| listener != id);
                if mailbox.is_empty() {
                    self.mailboxes.remove(owner);
                }
            }
        }

        removed.len()
    }
}

/// Cheap-clone handle to a listener registry
///
/// Clones share the same registrations and mailboxes.
pub struct Emitter<E: Event> {
    inner: Rc<RefCell<Registry<E>>>,
}

impl<E: Event> Clone for Emitter<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Event> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Event> fmt::Debug for Emitter<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.inner.borrow();
        f.debug_struct("Emitter")
            .field("listeners", &registry.registrations.len())
            .field("mailboxes", &registry.mailboxes.len())
            .finish()
    }
}

impl<E: Event> Emitter<E> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(Registry {
                next_id: 0,
                registrations: Vec::new(),
                mailboxes: HashMap::new(),
            })),
        }
    }

    /// Register `owner` for every event matching `topic`
    pub fn on(&self, owner: Owner, topic: Topic<E::Kind>) -> ListenerId {
        self.inner.borrow_mut().register(owner, topic, false)
    }

    /// Register `owner` for the first event matching `topic` only
    pub fn once(&self, owner: Owner, topic: Topic<E::Kind>) -> ListenerId {
        self.inner.borrow_mut().register(owner, topic, true)
    }

    /// Remove one registration
    ///
    /// Returns false if it was not registered (already removed or fired once).
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.borrow_mut().remove_where(|r| r.id == id) > 0
    }

    /// Remove every registration held by `owner`
    pub fn off_owner(&self, owner: Owner) -> usize {
        let mut registry = self.inner.borrow_mut();
        let removed = registry.remove_where(|r| r.owner == owner);
        registry.mailboxes.remove(&owner);
        removed
    }

    /// Remove every registration listening to exactly `topic`
    ///
    /// Wildcard registrations are untouched unless `topic` is [`Topic::All`].
    pub fn off_topic(&self, topic: &Topic<E::Kind>) -> usize {
        self.inner.borrow_mut().remove_where(|r| &r.topic == topic)
    }

    /// Remove every registration and pending delivery
    pub fn clear(&self) {
        let mut registry = self.inner.borrow_mut();
        registry.registrations.clear();
        registry.mailboxes.clear();
    }

    /// Deliver `event` to every matching registration
    pub fn emit(&self, event: E) {
        let kind = event.kind();
        let mut registry = self.inner.borrow_mut();

        let targets: Vec<(ListenerId, Owner, bool)> = registry
            .registrations
            .iter()
            .filter(|r| r.topic.matches(&kind))
            .map(|r| (r.id, r.owner, r.once))
            .collect();

        if targets.is_empty() {
            return;
        }

        for (id, owner, _) in &targets {
            let mailbox = registry.mailboxes.entry(*owner).or_default();
            if mailbox.len() >= MAX_MAILBOX_LEN {
                mailbox.pop_front();
                warn!(?owner, "Mailbox full, dropping oldest delivery");
            }
            mailbox.push_back((*id, event.clone()));
        }

        let fired_once: Vec<ListenerId> = targets
            .iter()
            .filter(|(_, _, once)| *once)
            .map(|(id, _, _)| *id)
            .collect();
        if !fired_once.is_empty() {
            registry
                .registrations
                .retain(|r| !fired_once.contains(&r.id));
        }
    }

    /// Take every pending delivery for `owner`, in emission order
    pub fn drain(&self, owner: Owner) -> Vec<(ListenerId, E)> {
        self.inner
            .borrow_mut()
            .mailboxes
            .remove(&owner)
            .map(Vec::from)
            .unwrap_or_default()
    }

    /// Check if `owner` has undelivered events
    pub fn has_pending(&self, owner: Owner) -> bool {
        self.inner
            .borrow()
            .mailboxes
            .get(&owner)
            .is_some_and(|mailbox| !mailbox.is_empty())
    }

    /// Number of undelivered events waiting for `owner`
    pub fn pending_count(&self, owner: Owner) -> usize {
        self.inner
            .borrow()
            .mailboxes
            .get(&owner)
            .map_or(0, VecDeque::len)
    }

    /// Total number of registrations
    pub fn listener_count(&self) -> usize {
        self.inner.borrow().registrations.len()
    }

    /// Number of registrations held by `owner`
    pub fn listener_count_for(&self, owner: Owner) -> usize {
        self.inner
            .borrow()
            .registrations
            .iter()
            .filter(|r| r.owner == owner)
            .count()
    }

    /// Check whether a registration is still live
    pub fn is_registered(&self, id: ListenerId) -> bool {
        self.inner
            .borrow()
            .registrations
            .iter()
            .any(|r| r.id == id)
    }

    /// Check whether two handles share the same registry
    pub fn same_registry(&self, other: &Emitter<E>) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}
