//! Fixed-capacity node pools
//!
//! Each node kind of the attribute tree is carved from its own [`Pool`], sized
//! once when the cache is built. A pool never grows: when its free-list is empty
//! allocation fails with [`PeerError::OutOfMemory`].
//!
//! Nodes are addressed by [`NodeId`], an index plus a per-slot generation. The
//! generation is bumped on release, so an id that outlived its node can never
//! reach whatever is allocated in the slot afterwards.
//!
//! Sibling nodes are chained through their own `next` field ([`Linked`]) and a
//! parent only stores a [`NodeList`] head/tail pair, so linking a node never
//! allocates.

use crate::error::{PeerError, PeerResult};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// The kinds of records the cache allocates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    Peer,
    Service,
    IncludedService,
    Characteristic,
    Descriptor,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeKind::Peer => "peer",
            NodeKind::Service => "service",
            NodeKind::IncludedService => "included service",
            NodeKind::Characteristic => "characteristic",
            NodeKind::Descriptor => "descriptor",
        };
        f.write_str(name)
    }
}

/// Handle to a node stored in a [`Pool<T>`]
pub struct NodeId<T> {
    index: u32,
    generation: u32,
    _kind: PhantomData<fn() -> T>,
}

impl<T> NodeId<T> {
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _kind: PhantomData,
        }
    }

    /// Slot index inside the owning pool
    pub fn index(&self) -> u32 {
        self.index
    }
}

impl<T> Clone for NodeId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeId<T> {}

impl<T> PartialEq for NodeId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for NodeId<T> {}

impl<T> Hash for NodeId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for NodeId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.index, self.generation)
    }
}

/// Usage counters for one pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub kind: NodeKind,
    pub capacity: usize,
    pub in_use: usize,
}

impl PoolStats {
    /// Number of nodes that can still be allocated
    pub fn available(&self) -> usize {
        self.capacity - self.in_use
    }
}

enum Slot<T> {
    Free { next_free: Option<u32> },
    Occupied(T),
}

struct Entry<T> {
    generation: u32,
    slot: Slot<T>,
}

/// A fixed-capacity free-list of nodes of one kind
pub(crate) struct Pool<T> {
    kind: NodeKind,
    entries: Vec<Entry<T>>,
    free_head: Option<u32>,
    in_use: usize,
}

impl<T> Pool<T> {
    /// Reserve storage for `capacity` nodes up front
    pub fn with_capacity(kind: NodeKind, capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        for index in 0..capacity {
            let next_free = if index + 1 < capacity {
                Some((index + 1) as u32)
            } else {
                None
            };
            entries.push(Entry {
                generation: 0,
                slot: Slot::Free { next_free },
            });
        }

        Self {
            kind,
            entries,
            free_head: if capacity > 0 { Some(0) } else { None },
            in_use: 0,
        }
    }

    /// Take a slot from the free-list and store `value` in it
    pub fn alloc(&mut self, value: T) -> PeerResult<NodeId<T>> {
        let index = self.free_head.ok_or(PeerError::OutOfMemory(self.kind))?;
        let entry = &mut self.entries[index as usize];

        let next_free = match entry.slot {
            Slot::Free { next_free } => next_free,
            // The free-list only ever links free slots
            Slot::Occupied(_) => return Err(PeerError::OutOfMemory(self.kind)),
        };

        entry.slot = Slot::Occupied(value);
        self.free_head = next_free;
        self.in_use += 1;

        Ok(NodeId::new(index, entry.generation))
    }

    /// Return a node to the free-list, handing back its contents.
    ///
    /// Returns `None` if `id` is stale.
    pub fn release(&mut self, id: NodeId<T>) -> Option<T> {
        let free_head = self.free_head;
        let entry = self.entries.get_mut(id.index as usize)?;
        if entry.generation != id.generation || matches!(entry.slot, Slot::Free { .. }) {
            return None;
        }

        let slot = std::mem::replace(
            &mut entry.slot,
            Slot::Free {
                next_free: free_head,
            },
        );
        entry.generation = entry.generation.wrapping_add(1);
        self.free_head = Some(id.index);
        self.in_use -= 1;

        match slot {
            Slot::Occupied(value) => Some(value),
            Slot::Free { .. } => None,
        }
    }

    pub fn get(&self, id: NodeId<T>) -> Option<&T> {
        let entry = self.entries.get(id.index as usize)?;
        match &entry.slot {
            Slot::Occupied(value) if entry.generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn get_mut(&mut self, id: NodeId<T>) -> Option<&mut T> {
        let entry = self.entries.get_mut(id.index as usize)?;
        match &mut entry.slot {
            Slot::Occupied(value) if entry.generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            kind: self.kind,
            capacity: self.entries.len(),
            in_use: self.in_use,
        }
    }
}

/// A node that can be chained into a [`NodeList`]
pub(crate) trait Linked: Sized {
    fn next(&self) -> Option<NodeId<Self>>;
    fn set_next(&mut self, next: Option<NodeId<Self>>);
}

/// Head/tail pair of a singly linked list of pool nodes
pub(crate) struct NodeList<T> {
    head: Option<NodeId<T>>,
    tail: Option<NodeId<T>>,
    len: usize,
}

impl<T> NodeList<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    pub fn head(&self) -> Option<NodeId<T>> {
        self.head
    }

    pub fn tail(&self) -> Option<NodeId<T>> {
        self.tail
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl<T> Clone for NodeList<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for NodeList<T> {}

impl<T> Default for NodeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for NodeList<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeList")
            .field("head", &self.head)
            .field("tail", &self.tail)
            .field("len", &self.len)
            .finish()
    }
}

impl<T: Linked> Pool<T> {
    /// Allocate `value` and append it at the tail of `list`
    pub fn push_back(&mut self, list: &mut NodeList<T>, value: T) -> PeerResult<NodeId<T>> {
        let id = self.alloc(value)?;

        match list.tail.and_then(|tail| self.get_mut(tail)) {
            Some(tail) => tail.set_next(Some(id)),
            None => list.head = Some(id),
        }
        list.tail = Some(id);
        list.len += 1;

        Ok(id)
    }

    /// Detach `id` from `list` without releasing it
    pub fn unlink(&mut self, list: &mut NodeList<T>, id: NodeId<T>) -> bool {
        let mut prev: Option<NodeId<T>> = None;
        let mut cursor = list.head;

        while let Some(current) = cursor {
            let next = match self.get(current) {
                Some(node) => node.next(),
                None => return false,
            };

            if current == id {
                match prev.and_then(|p| self.get_mut(p)) {
                    Some(prev_node) => prev_node.set_next(next),
                    None => list.head = next,
                }
                if list.tail == Some(id) {
                    list.tail = prev;
                }
                if let Some(node) = self.get_mut(id) {
                    node.set_next(None);
                }
                list.len -= 1;
                return true;
            }

            prev = Some(current);
            cursor = next;
        }

        false
    }

    /// Iterate over the nodes of `list` in link order
    pub fn iter<'a>(&'a self, list: &NodeList<T>) -> ListIter<'a, T> {
        ListIter {
            pool: self,
            cursor: list.head,
        }
    }
}

/// Iterator over the nodes of a [`NodeList`]
pub(crate) struct ListIter<'a, T> {
    pool: &'a Pool<T>,
    cursor: Option<NodeId<T>>,
}

impl<'a, T: Linked> Iterator for ListIter<'a, T> {
    type Item = (NodeId<T>, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        let node = self.pool.get(id)?;
        self.cursor = node.next();
        Some((id, node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Item {
        value: u16,
        next: Option<NodeId<Item>>,
    }

    impl Item {
        fn new(value: u16) -> Self {
            Self { value, next: None }
        }
    }

    impl Linked for Item {
        fn next(&self) -> Option<NodeId<Self>> {
            self.next
        }

        fn set_next(&mut self, next: Option<NodeId<Self>>) {
            self.next = next;
        }
    }

    fn values(pool: &Pool<Item>, list: &NodeList<Item>) -> Vec<u16> {
        pool.iter(list).map(|(_, item)| item.value).collect()
    }

    #[test]
    fn test_alloc_until_exhausted() {
        let mut pool = Pool::with_capacity(NodeKind::Descriptor, 2);

        pool.alloc(Item::new(1)).unwrap();
        pool.alloc(Item::new(2)).unwrap();
        assert_eq!(
            pool.alloc(Item::new(3)).err(),
            Some(PeerError::OutOfMemory(NodeKind::Descriptor))
        );

        let stats = pool.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.in_use, 2);
        assert_eq!(stats.available(), 0);
    }

    #[test]
    fn test_zero_capacity_pool() {
        let mut pool: Pool<Item> = Pool::with_capacity(NodeKind::IncludedService, 0);
        assert_eq!(
            pool.alloc(Item::new(1)).err(),
            Some(PeerError::OutOfMemory(NodeKind::IncludedService))
        );
    }

    #[test]
    fn test_release_invalidates_stale_ids() {
        let mut pool = Pool::with_capacity(NodeKind::Service, 1);

        let first = pool.alloc(Item::new(7)).unwrap();
        assert_eq!(pool.release(first).map(|item| item.value), Some(7));
        assert!(pool.release(first).is_none());

        // The slot is reused, but the old id must not reach the new node
        let second = pool.alloc(Item::new(8)).unwrap();
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(pool.get(first).is_none());
        assert_eq!(pool.get(second).map(|item| item.value), Some(8));
    }

    #[test]
    fn test_push_back_keeps_order() {
        let mut pool = Pool::with_capacity(NodeKind::Characteristic, 4);
        let mut list = NodeList::new();

        for value in [3, 5, 9] {
            pool.push_back(&mut list, Item::new(value)).unwrap();
        }

        assert_eq!(list.len(), 3);
        assert_eq!(values(&pool, &list), vec![3, 5, 9]);
        assert_eq!(list.tail().and_then(|id| pool.get(id)).map(|i| i.value), Some(9));
    }

    #[test]
    fn test_unlink_middle_and_tail() {
        let mut pool = Pool::with_capacity(NodeKind::Peer, 4);
        let mut list = NodeList::new();

        let a = pool.push_back(&mut list, Item::new(1)).unwrap();
        let b = pool.push_back(&mut list, Item::new(2)).unwrap();
        let c = pool.push_back(&mut list, Item::new(3)).unwrap();

        assert!(pool.unlink(&mut list, b));
        assert_eq!(values(&pool, &list), vec![1, 3]);

        assert!(pool.unlink(&mut list, c));
        assert_eq!(values(&pool, &list), vec![1]);
        assert_eq!(list.tail(), Some(a));

        // Appending after removing the tail must link from the new tail
        pool.push_back(&mut list, Item::new(4)).unwrap();
        assert_eq!(values(&pool, &list), vec![1, 4]);

        assert!(!pool.unlink(&mut list, b));
    }
}
