//! Arena-backed doubly linked list.
//!
//! Nodes live in a slot vector and link to each other by index, so any node
//! can be unlinked in O(1) through the [`Key`] handed out on insertion. Each
//! slot carries a generation that is bumped when the slot is vacated; a stale
//! key therefore never reaches a node that reused its slot.

/// Handle to a node in a [`LinkedSlab`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct Key {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug)]
struct Slot<T> {
    generation: u64,
    node: Option<Node<T>>,
}

/// Ordered collection with O(1) push at either end and O(1) removal by key.
#[derive(Debug)]
pub(crate) struct LinkedSlab<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
}

impl<T> Default for LinkedSlab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LinkedSlab<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn push_back(&mut self, value: T) -> Key {
        let tail = self.tail;
        let key = self.allocate(Node {
            value,
            prev: tail,
            next: None,
        });

        match tail {
            Some(tail) => self.node_mut(tail).next = Some(key.index),
            None => self.head = Some(key.index),
        }
        self.tail = Some(key.index);
        key
    }

    pub(crate) fn push_front(&mut self, value: T) -> Key {
        let head = self.head;
        let key = self.allocate(Node {
            value,
            prev: None,
            next: head,
        });

        match head {
            Some(head) => self.node_mut(head).prev = Some(key.index),
            None => self.tail = Some(key.index),
        }
        self.head = Some(key.index);
        key
    }

    pub(crate) fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        Some(self.unlink(head))
    }

    /// Unlink the node behind `key`, if it is still present.
    pub(crate) fn remove(&mut self, key: Key) -> Option<T> {
        if !self.contains(key) {
            return None;
        }
        Some(self.unlink(key.index))
    }

    pub(crate) fn contains(&self, key: Key) -> bool {
        self.slots
            .get(key.index)
            .is_some_and(|slot| slot.generation == key.generation && slot.node.is_some())
    }

    pub(crate) fn get(&self, key: Key) -> Option<&T> {
        let slot = self.slots.get(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref().map(|node| &node.value)
    }

    pub(crate) fn get_mut(&mut self, key: Key) -> Option<&mut T> {
        let slot = self.slots.get_mut(key.index)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut().map(|node| &mut node.value)
    }

    pub(crate) fn front(&self) -> Option<&T> {
        self.head.and_then(|index| self.value(index))
    }

    pub(crate) fn back(&self) -> Option<&T> {
        self.tail.and_then(|index| self.value(index))
    }

    /// Iterate front to back.
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            list: self,
            cursor: self.head,
        }
    }

    fn value(&self, index: usize) -> Option<&T> {
        self.slots[index].node.as_ref().map(|node| &node.value)
    }

    fn allocate(&mut self, node: Node<T>) -> Key {
        self.len += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index];
            slot.node = Some(node);
            return Key {
                index,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        Key {
            index: self.slots.len() - 1,
            generation: 0,
        }
    }

    /// Detach an occupied slot and relink its neighbours.
    fn unlink(&mut self, index: usize) -> T {
        let slot = &mut self.slots[index];
        let Some(node) = slot.node.take() else {
            unreachable!("unlink called on a vacant slot");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(index);
        self.len -= 1;

        match node.prev {
            Some(prev) => self.node_mut(prev).next = node.next,
            None => self.head = node.next,
        }
        match node.next {
            Some(next) => self.node_mut(next).prev = node.prev,
            None => self.tail = node.prev,
        }

        node.value
    }

    fn node_mut(&mut self, index: usize) -> &mut Node<T> {
        match self.slots[index].node.as_mut() {
            Some(node) => node,
            None => unreachable!("linked index points at a vacant slot"),
        }
    }
}

/// Front-to-back iterator yielding each node's key and value.
pub(crate) struct Iter<'a, T> {
    list: &'a LinkedSlab<T>,
    cursor: Option<usize>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = (Key, &'a T);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.cursor?;
        let slot = &self.list.slots[index];
        let node = slot.node.as_ref()?;
        self.cursor = node.next;

        let key = Key {
            index,
            generation: slot.generation,
        };
        Some((key, &node.value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(list: &LinkedSlab<i32>) -> Vec<i32> {
        list.iter().map(|(_, v)| *v).collect()
    }

    #[test]
    fn test_push_and_pop() {
        let mut list = LinkedSlab::new();
        list.push_back(2);
        list.push_back(3);
        list.push_front(1);

        assert_eq!(values(&list), vec![1, 2, 3]);
        assert_eq!(list.front(), Some(&1));
        assert_eq!(list.back(), Some(&3));
        assert_eq!(list.pop_front(), Some(1));
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_remove_middle() {
        let mut list = LinkedSlab::new();
        list.push_back(1);
        let middle = list.push_back(2);
        list.push_back(3);

        assert_eq!(list.remove(middle), Some(2));
        assert_eq!(values(&list), vec![1, 3]);
        assert_eq!(list.remove(middle), None);
    }

    #[test]
    fn test_remove_ends() {
        let mut list = LinkedSlab::new();
        let first = list.push_back(1);
        list.push_back(2);
        let last = list.push_back(3);

        list.remove(first);
        list.remove(last);
        assert_eq!(values(&list), vec![2]);
        assert_eq!(list.front(), list.back());
    }

    #[test]
    fn test_stale_key_after_reuse() {
        let mut list = LinkedSlab::new();
        let old = list.push_back(1);
        list.remove(old);

        let new = list.push_back(2);
        assert!(!list.contains(old));
        assert!(list.contains(new));
        assert_eq!(list.remove(old), None);
        assert!(list.get_mut(old).is_none());
        assert!(list.get(old).is_none());
        assert_eq!(list.get(new), Some(&2));
        assert_eq!(values(&list), vec![2]);
    }

    #[test]
    fn test_get_mut() {
        let mut list = LinkedSlab::new();
        let key = list.push_back(1);
        *list.get_mut(key).unwrap() = 10;
        assert_eq!(values(&list), vec![10]);
    }

    #[test]
    fn test_empty() {
        let mut list: LinkedSlab<i32> = LinkedSlab::new();
        assert!(list.is_empty());
        assert_eq!(list.pop_front(), None);
        assert_eq!(list.front(), None);
        assert_eq!(list.iter().count(), 0);
    }
}
