//! Append-only sequence with cheap clones.
//!
//! Items are gathered in a short tail and sealed into shared chunks once the
//! tail is full. A clone shares every sealed chunk and copies only the tail,
//! so handing out a snapshot after each event stays proportional to the
//! chunk size, not to the length of the log.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::iter::{Chain, FlatMap, Skip};
use core::slice;

use crate::event::types::TransactionEvent;

const CHUNK_LEN: usize = 256;

/// The flat, receipt-ordered log of every event.
pub type EventLog = ChunkedLog<Arc<TransactionEvent>>;

type ChunkItems<T> = fn(&Arc<[T]>) -> &[T];

pub type Iter<'a, T> =
    Chain<FlatMap<slice::Iter<'a, Arc<[T]>>, &'a [T], ChunkItems<T>>, slice::Iter<'a, T>>;

fn chunk_items<T>(chunk: &Arc<[T]>) -> &[T] {
    chunk
}

#[derive(Debug, Clone)]
pub struct ChunkedLog<T> {
    sealed: Arc<Vec<Arc<[T]>>>,
    tail: Vec<T>,
}

impl<T> Default for ChunkedLog<T> {
    fn default() -> Self {
        Self {
            sealed: Arc::default(),
            tail: Vec::new(),
        }
    }
}

impl<T> ChunkedLog<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, item: T) {
        if self.tail.capacity() == 0 {
            self.tail.reserve_exact(CHUNK_LEN);
        }
        self.tail.push(item);
        if self.tail.len() == CHUNK_LEN {
            let chunk: Arc<[T]> = core::mem::take(&mut self.tail).into();
            Arc::make_mut(&mut self.sealed).push(chunk);
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sealed.len() * CHUNK_LEN + self.tail.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sealed.is_empty() && self.tail.is_empty()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&T> {
        let sealed_len = self.sealed.len() * CHUNK_LEN;
        if index < sealed_len {
            self.sealed
                .get(index / CHUNK_LEN)
                .and_then(|chunk| chunk.get(index % CHUNK_LEN))
        } else {
            self.tail.get(index - sealed_len)
        }
    }

    #[must_use]
    pub fn last(&self) -> Option<&T> {
        self.tail
            .last()
            .or_else(|| self.sealed.last().and_then(|chunk| chunk.last()))
    }

    pub fn iter(&self) -> Iter<'_, T> {
        self.sealed
            .iter()
            .flat_map(chunk_items as ChunkItems<T>)
            .chain(self.tail.iter())
    }

    /// Items from position `start` on, skipping whole chunks without
    /// walking them.
    pub fn iter_from(&self, start: usize) -> Skip<Iter<'_, T>> {
        let first_chunk = (start / CHUNK_LEN).min(self.sealed.len());
        self.sealed[first_chunk..]
            .iter()
            .flat_map(chunk_items as ChunkItems<T>)
            .chain(self.tail.iter())
            .skip(start - first_chunk * CHUNK_LEN)
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl<'a, T> IntoIterator for &'a ChunkedLog<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T: PartialEq> PartialEq for ChunkedLog<T> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<T: serde::Serialize> serde::Serialize for ChunkedLog<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}
