/// Handle to an entry of an [`LruList`]; stays valid until the entry is removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LruHandle(usize);

#[derive(Debug)]
struct Node<K> {
    key: K,
    /// Neighbour towards the most recently used end
    prev: Option<usize>,
    /// Neighbour towards the least recently used end
    next: Option<usize>,
}

/// Recency order over a set of keys.
///
/// Nodes live in an arena of slots addressed by integer handles and are
/// linked by index, so touch, insert and remove are all O(1). Freed slots
/// are recycled.
#[derive(Debug)]
pub struct LruList<K> {
    slots: Vec<Option<Node<K>>>,
    free: Vec<usize>,
    /// Most recently used
    head: Option<usize>,
    /// Least recently used
    tail: Option<usize>,
    len: usize,
}

impl<K: Copy> LruList<K> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Inserts a key as the most recently used entry.
    pub fn push_front(&mut self, key: K) -> LruHandle {
        let node = Node {
            key,
            prev: None,
            next: None,
        };
        let index = match self.free.pop() {
            Some(index) => {
                self.slots[index] = Some(node);
                index
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        };
        self.link_front(index);
        self.len += 1;
        LruHandle(index)
    }

    /// Marks an entry as the most recently used.
    pub fn touch(&mut self, handle: LruHandle) {
        if self.node(handle.0).is_none() || self.head == Some(handle.0) {
            return;
        }
        self.unlink(handle.0);
        self.link_front(handle.0);
    }

    /// Removes an entry, returning its key.
    pub fn remove(&mut self, handle: LruHandle) -> Option<K> {
        self.node(handle.0)?;
        self.unlink(handle.0);
        let node = self.slots[handle.0].take()?;
        self.free.push(handle.0);
        self.len -= 1;
        Some(node.key)
    }

    /// Returns the key behind a handle.
    #[cfg(test)]
    pub fn get(&self, handle: LruHandle) -> Option<K> {
        self.node(handle.0).map(|node| node.key)
    }

    /// Returns the least recently used key.
    #[cfg(test)]
    pub fn back(&self) -> Option<K> {
        self.tail.and_then(|index| self.node(index)).map(|node| node.key)
    }

    /// Iterates from the least to the most recently used key.
    pub fn iter_lru(&self) -> impl Iterator<Item = K> + '_ {
        let mut cursor = self.tail;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.prev;
            Some(node.key)
        })
    }

    /// Iterates from the most to the least recently used key.
    #[cfg(test)]
    pub fn iter_mru(&self) -> impl Iterator<Item = K> + '_ {
        let mut cursor = self.head;
        std::iter::from_fn(move || {
            let node = self.node(cursor?)?;
            cursor = node.next;
            Some(node.key)
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn node(&self, index: usize) -> Option<&Node<K>> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, index: usize) -> Option<&mut Node<K>> {
        self.slots.get_mut(index).and_then(Option::as_mut)
    }

    fn link_front(&mut self, index: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(index) {
            node.prev = None;
            node.next = old_head;
        }
        match old_head.and_then(|h| self.node_mut(h)) {
            Some(head) => head.prev = Some(index),
            None => self.tail = Some(index),
        }
        self.head = Some(index);
    }

    fn unlink(&mut self, index: usize) {
        let Some((prev, next)) = self.node(index).map(|node| (node.prev, node.next)) else {
            return;
        };

        match prev.and_then(|p| self.node_mut(p)) {
            Some(prev_node) => prev_node.next = next,
            None => self.head = next,
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(next_node) => next_node.prev = prev,
            None => self.tail = prev,
        }

        if let Some(node) = self.node_mut(index) {
            node.prev = None;
            node.next = None;
        }
    }
}

impl<K: Copy> Default for LruList<K> {
    fn default() -> Self {
        Self::new()
    }
}
