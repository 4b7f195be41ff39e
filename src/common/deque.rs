// License and Copyright Notice:
//
// Some of the code and doc comments in this module were copied from
// `std::collections::LinkedList` in the Rust standard library.
// https://github.com/rust-lang/rust/blob/master/src/liballoc/collections/linked_list.rs
//
// The original code/comments from LinkedList are dual-licensed under
// the Apache License, Version 2.0 <https://github.com/rust-lang/rust/blob/master/LICENSE-APACHE>
// or the MIT license <https://github.com/rust-lang/rust/blob/master/LICENSE-MIT>
//
// Copyrights of the original code/comments are retained by their contributors.
// For full authorship information, see the version control history of
// https://github.com/rust-lang/rust/ or https://thanks.rust-lang.org

use std::{marker::PhantomData, ptr::NonNull};

use super::Segment;

/// A node of an intrusive doubly linked list.
///
/// Unlike `std::collections::LinkedList`, a `Deque` never owns its nodes. A node
/// is allocated by its owner (the item map of a shard), linked into at most one
/// deque at a time, and freed by the owner after it has been unlinked.
pub(crate) struct DeqNode<T> {
    next: Option<NonNull<DeqNode<T>>>,
    prev: Option<NonNull<DeqNode<T>>>,
    pub(crate) element: T,
}

impl<T> std::fmt::Debug for DeqNode<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeqNode")
            .field("next", &self.next)
            .field("prev", &self.prev)
            .finish()
    }
}

impl<T> DeqNode<T> {
    pub(crate) fn new(element: T) -> Self {
        Self {
            next: None,
            prev: None,
            element,
        }
    }

    /// Moves a node onto the heap and returns a raw pointer to it. The caller
    /// becomes responsible for eventually passing it to `free`.
    pub(crate) fn into_raw(self) -> NonNull<Self> {
        let node = Box::new(self);
        // Box::into_raw never returns a null pointer.
        unsafe { NonNull::new_unchecked(Box::into_raw(node)) }
    }

    /// Reclaims a node allocated by `into_raw`.
    ///
    /// # Safety
    ///
    /// The node must not be linked into any deque and must not be referenced
    /// anywhere else.
    pub(crate) unsafe fn free(this: NonNull<Self>) -> T {
        let node = Box::from_raw(this.as_ptr());
        debug_assert!(node.prev.is_none() && node.next.is_none());
        node.element
    }
}

/// An intrusive doubly linked list of `DeqNode`s.
///
/// The front of the deque holds the least recently used node and the back holds
/// the most recently used one. New nodes are pushed to the back and victims are
/// taken from the front.
pub(crate) struct Deque<T> {
    segment: Segment,
    len: usize,
    head: Option<NonNull<DeqNode<T>>>,
    tail: Option<NonNull<DeqNode<T>>>,
    marker: PhantomData<NonNull<DeqNode<T>>>,
}

impl<T> Deque<T> {
    pub(crate) fn new(segment: Segment) -> Self {
        Self {
            segment,
            len: 0,
            head: None,
            tail: None,
            marker: PhantomData,
        }
    }

    pub(crate) fn segment(&self) -> Segment {
        self.segment
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn contains(&self, node: &DeqNode<T>) -> bool {
        node.prev.is_some() || self.is_head(node)
    }

    /// Returns the least recently used node.
    pub(crate) fn peek_front_ptr(&self) -> Option<NonNull<DeqNode<T>>> {
        self.head
    }

    /// Adds the given node to the back of the list.
    ///
    /// # Safety
    ///
    /// The node must be valid and must not be linked into any deque.
    pub(crate) unsafe fn push_back(&mut self, node: NonNull<DeqNode<T>>) {
        // This method takes care not to create mutable references to whole nodes,
        // to maintain validity of aliasing pointers into `element`.
        (*node.as_ptr()).next = None;
        (*node.as_ptr()).prev = self.tail;

        match self.tail {
            None => self.head = Some(node),
            // Not creating new mutable (unique!) references overlapping `element`.
            Some(tail) => (*tail.as_ptr()).next = Some(node),
        }

        self.tail = Some(node);
        self.len += 1;
    }

    /// Moves a node already linked into this deque to the back.
    ///
    /// # Safety
    ///
    /// The node must be valid and linked into this deque.
    pub(crate) unsafe fn move_to_back(&mut self, node: NonNull<DeqNode<T>>) {
        if self.is_tail(node.as_ref()) {
            // Already at the tail. Nothing to do.
            return;
        }
        self.unlink(node);
        self.push_back(node);
    }

    /// Unlinks the specified node from the current list.
    ///
    /// This method does not free the node. The owner of the node is responsible
    /// for that.
    ///
    /// # Safety
    ///
    /// The node must be valid and linked into this deque.
    pub(crate) unsafe fn unlink(&mut self, node: NonNull<DeqNode<T>>) {
        let node = node.as_ptr();

        // Not creating new mutable (unique!) references overlapping `element`.
        match (*node).prev {
            Some(prev) => (*prev.as_ptr()).next = (*node).next,
            // this node is the head node
            None => self.head = (*node).next,
        };

        match (*node).next {
            Some(next) => (*next.as_ptr()).prev = (*node).prev,
            // this node is the tail node
            None => self.tail = (*node).prev,
        };

        (*node).prev = None;
        (*node).next = None;

        self.len -= 1;
    }

    /// Unlinks every node and returns them from front to back.
    pub(crate) fn take_all(&mut self) -> Vec<NonNull<DeqNode<T>>> {
        let mut nodes = Vec::with_capacity(self.len);
        while let Some(node) = self.head {
            unsafe { self.unlink(node) };
            nodes.push(node);
        }
        nodes
    }

    /// Returns an iterator over the elements from front to back.
    #[cfg(test)]
    pub(crate) fn iter(&self) -> Iter<'_, T> {
        Iter {
            next: self.head,
            marker: PhantomData,
        }
    }
}

#[cfg(test)]
pub(crate) struct Iter<'a, T> {
    next: Option<NonNull<DeqNode<T>>>,
    marker: PhantomData<&'a DeqNode<T>>,
}

#[cfg(test)]
impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        self.next.map(|node| unsafe {
            let node = &*node.as_ptr();
            self.next = node.next;
            &node.element
        })
    }
}

// Private function/methods
impl<T> Deque<T> {
    fn is_head(&self, node: &DeqNode<T>) -> bool {
        if let Some(head) = self.head {
            std::ptr::eq(unsafe { head.as_ref() }, node)
        } else {
            false
        }
    }

    fn is_tail(&self, node: &DeqNode<T>) -> bool {
        if let Some(tail) = self.tail {
            std::ptr::eq(unsafe { tail.as_ref() }, node)
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{DeqNode, Deque, Segment};

    fn elements(deque: &Deque<String>) -> Vec<&str> {
        deque.iter().map(String::as_str).collect()
    }

    #[test]
    #[allow(clippy::cognitive_complexity)]
    fn basics() {
        let mut deque: Deque<String> = Deque::new(Segment::Younger);
        assert_eq!(deque.segment(), Segment::Younger);
        assert_eq!(deque.len(), 0);
        assert!(deque.is_empty());
        assert!(deque.peek_front_ptr().is_none());

        // push_back(node1)
        let node1 = DeqNode::new("a".to_string());
        assert!(!deque.contains(&node1));
        let node1 = node1.into_raw();
        unsafe { deque.push_back(node1) };
        assert_eq!(deque.len(), 1);
        assert!(deque.contains(unsafe { node1.as_ref() }));
        assert!(deque.is_head(unsafe { node1.as_ref() }));
        assert!(deque.is_tail(unsafe { node1.as_ref() }));

        // move_to_back(node1) is a no-op for a single node.
        unsafe { deque.move_to_back(node1) };
        assert_eq!(deque.len(), 1);
        assert_eq!(elements(&deque), vec!["a"]);

        // push_back(node2), push_back(node3)
        let node2 = DeqNode::new("b".to_string()).into_raw();
        let node3 = DeqNode::new("c".to_string()).into_raw();
        unsafe {
            deque.push_back(node2);
            deque.push_back(node3);
        }
        assert_eq!(deque.len(), 3);
        assert_eq!(elements(&deque), vec!["a", "b", "c"]);
        assert_eq!(deque.peek_front_ptr(), Some(node1));

        // move_to_back(node1) from the head.
        unsafe { deque.move_to_back(node1) };
        assert_eq!(elements(&deque), vec!["b", "c", "a"]);
        assert!(deque.is_tail(unsafe { node1.as_ref() }));

        // move_to_back(node3) from the middle.
        unsafe { deque.move_to_back(node3) };
        assert_eq!(elements(&deque), vec!["b", "a", "c"]);

        // unlink(node1) from the middle.
        unsafe { deque.unlink(node1) };
        assert_eq!(deque.len(), 2);
        assert!(!deque.contains(unsafe { node1.as_ref() }));
        assert_eq!(elements(&deque), vec!["b", "c"]);
        assert_eq!(unsafe { DeqNode::free(node1) }, "a");

        // unlink(node3) at the tail.
        unsafe { deque.unlink(node3) };
        assert_eq!(elements(&deque), vec!["b"]);
        assert!(deque.is_tail(unsafe { node2.as_ref() }));
        assert_eq!(unsafe { DeqNode::free(node3) }, "c");

        let rest = deque.take_all();
        assert_eq!(rest, vec![node2]);
        assert!(deque.is_empty());
        assert!(deque.peek_front_ptr().is_none());
        assert_eq!(unsafe { DeqNode::free(node2) }, "b");
    }

    #[test]
    fn nodes_move_between_deques() {
        let mut younger: Deque<u32> = Deque::new(Segment::Younger);
        let mut older: Deque<u32> = Deque::new(Segment::Older);

        let nodes: Vec<_> = (0..4).map(|n| DeqNode::new(n).into_raw()).collect();
        for node in &nodes {
            unsafe { younger.push_back(*node) };
        }

        unsafe {
            younger.unlink(nodes[1]);
            older.push_back(nodes[1]);
        }
        assert_eq!(younger.iter().copied().collect::<Vec<_>>(), vec![0, 2, 3]);
        assert_eq!(older.iter().copied().collect::<Vec<_>>(), vec![1]);
        assert!(older.contains(unsafe { nodes[1].as_ref() }));

        for node in younger.take_all().into_iter().chain(older.take_all()) {
            unsafe { DeqNode::free(node) };
        }
    }
}
