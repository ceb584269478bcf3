use std::{marker::PhantomData, ptr::NonNull};

/// Nullable pointer to a list node.
pub(crate) type Link<T> = Option<NonNull<Node<T>>>;

/// A node of the list: the links plus the element they carry. Region and
/// block headers are always written into mapped memory as a `Node<T>`, so
/// the links live right next to the metadata they chain together.
pub(crate) struct Node<T> {
    /// Pointer to the next node of the list
    pub next: Link<T>,
    /// Pointer to the previous node of the list
    pub prev: Link<T>,
    /// Element of the node
    pub data: T,
}

/// Doubly-linked list whose nodes live at caller-chosen addresses.
///
/// Because we are the actual memory allocator, this list can never allocate
/// for itself: every insertion receives the address where its node must be
/// written. The list only rewires links; it owns no storage.
pub(crate) struct List<T> {
    head: Link<T>,
    tail: Link<T>,
    marker: PhantomData<T>,
}

pub(crate) struct Iter<'a, T> {
    current: Link<T>,
    marker: PhantomData<&'a Node<T>>,
}

impl<T> List<T> {
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            marker: PhantomData,
        }
    }

    #[inline]
    pub fn first(&self) -> Link<T> {
        self.head
    }

    /// Writes `data` as a new node at `addr` and links it as the new tail.
    ///
    /// SAFETY: caller must guarantee that `addr` points to writable memory
    /// with room for a `Node<T>`, not overlapping any live node.
    pub unsafe fn append(&mut self, data: T, addr: NonNull<u8>) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: None,
                prev: self.tail,
                data,
            });

            if let Some(mut tail) = self.tail {
                tail.as_mut().next = Some(node);
            } else {
                self.head = Some(node);
            }
        }

        self.tail = Some(node);
        node
    }

    /// Writes `data` as a new node at `addr` and links it immediately after
    /// `after`, inheriting `after`'s previous next-link.
    ///
    /// SAFETY: same as [`List::append`], and `after` must be a live node of
    /// this list.
    pub unsafe fn insert_after(
        &mut self,
        mut after: NonNull<Node<T>>,
        data: T,
        addr: NonNull<u8>,
    ) -> NonNull<Node<T>> {
        let node = addr.cast::<Node<T>>();

        unsafe {
            node.as_ptr().write(Node {
                next: after.as_ref().next,
                prev: Some(after),
                data,
            });

            if let Some(mut next) = after.as_ref().next {
                next.as_mut().prev = Some(node);
            } else {
                self.tail = Some(node);
            }

            after.as_mut().next = Some(node);
        }

        node
    }

    /// Unlinks `node` from the list. The node's storage is untouched; it
    /// simply stops being reachable from the list.
    ///
    /// SAFETY: `node` must be a live node of this list.
    pub unsafe fn remove(&mut self, node: NonNull<Node<T>>) {
        unsafe {
            match node.as_ref().prev {
                Some(mut prev) => prev.as_mut().next = node.as_ref().next,
                None => self.head = node.as_ref().next,
            }

            match node.as_ref().next {
                Some(mut next) => next.as_mut().prev = node.as_ref().prev,
                None => self.tail = node.as_ref().prev,
            }
        }
    }

    pub fn iter(&self) -> Iter<'_, T> {
        Iter {
            current: self.head,
            marker: PhantomData,
        }
    }
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a Node<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current?;

        unsafe {
            self.current = node.as_ref().next;
            Some(&*node.as_ptr())
        }
    }
}

impl<'a, T> IntoIterator for &'a List<T> {
    type Item = &'a Node<T>;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
