//! Lot queue implemented using VecDeque
use std::collections::vec_deque::{IntoIter, Iter};
use std::collections::VecDeque;
use std::ops::Index;

/// First-in-first-out queue. Items are appended at the back and consumed from the front.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FIFO<A> {
    deq: VecDeque<A>,
}

impl<A> Default for FIFO<A> {
    fn default() -> Self {
        Self {
            deq: VecDeque::new(),
        }
    }
}

impl<A> FIFO<A> {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn iter(&self) -> Iter<'_, A> {
        self.deq.iter()
    }
    pub fn append_back(&mut self, e: A) {
        self.deq.push_back(e);
    }
    pub fn pop_front(&mut self) -> Option<A> {
        self.deq.pop_front()
    }
    pub fn peek_front(&self) -> Option<&A> {
        self.deq.front()
    }
    // Partial consumption mutates the head in place; it is only popped once exhausted.
    pub fn peek_front_mut(&mut self) -> Option<&mut A> {
        self.deq.front_mut()
    }
    pub fn len(&self) -> usize {
        self.deq.len()
    }
    pub fn is_empty(&self) -> bool {
        self.deq.is_empty()
    }
}

impl<A> Index<usize> for FIFO<A> {
    type Output = A;

    fn index(&self, index: usize) -> &Self::Output {
        self.deq.index(index)
    }
}

impl<A> FromIterator<A> for FIFO<A> {
    fn from_iter<T: IntoIterator<Item = A>>(iter: T) -> Self {
        Self {
            deq: iter.into_iter().collect(),
        }
    }
}

impl<A> IntoIterator for FIFO<A> {
    type Item = A;
    type IntoIter = IntoIter<Self::Item>;
    fn into_iter(self) -> Self::IntoIter {
        self.deq.into_iter()
    }
}

impl<'a, A> IntoIterator for &'a FIFO<A> {
    type Item = &'a A;
    type IntoIter = Iter<'a, A>;
    fn into_iter(self) -> Self::IntoIter {
        self.deq.iter()
    }
}

impl<A> Extend<A> for FIFO<A> {
    fn extend<T: IntoIterator<Item = A>>(&mut self, iter: T) {
        for item in iter.into_iter() {
            self.append_back(item);
        }
    }
}
