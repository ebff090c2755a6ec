//! Bounded blocking queue between ingest producers and one analysis consumer.
//!
//! Every queue knows which files produce into it. The terminal sentinel is
//! enqueued when the last of them closes, so a consumer sees it exactly once.

use std::collections::{BTreeSet, VecDeque};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FifoError {
    #[error("queue aborted")]
    Aborted,

    #[error("pop after terminal sentinel was consumed")]
    Drained,

    #[error("push after all producers closed")]
    Closed,

    #[error("producer {0} is not registered")]
    UnknownProducer(usize),
}

enum Entry<T> {
    Item(T),
    End,
}

struct Inner<T> {
    entries: VecDeque<Entry<T>>,
    open: BTreeSet<usize>,
    registered: BTreeSet<usize>,
    pushes: u64,
    pops: u64,
    end_pushed: bool,
    end_popped: bool,
    aborted: bool,
}

pub struct Fifo<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl<T> std::fmt::Debug for Fifo<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (pushes, pops) = self.counters();
        f.debug_struct("Fifo")
            .field("capacity", &self.capacity)
            .field("pushes", &pushes)
            .field("pops", &pops)
            .finish()
    }
}

impl<T> Fifo<T> {
    pub fn new(capacity: usize, producers: impl IntoIterator<Item = usize>) -> Self {
        let registered: BTreeSet<usize> = producers.into_iter().collect();
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                entries: VecDeque::with_capacity(capacity.min(4096)),
                open: registered.clone(),
                registered,
                pushes: 0,
                pops: 0,
                end_pushed: false,
                end_popped: false,
                aborted: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Blocks while the queue is full.
    pub fn push(&self, item: T) -> Result<(), FifoError> {
        let mut g = self.inner.lock();
        loop {
            if g.aborted {
                return Err(FifoError::Aborted);
            }
            if g.end_pushed {
                return Err(FifoError::Closed);
            }
            if g.entries.len() < self.capacity {
                break;
            }
            self.not_full.wait(&mut g);
        }
        g.entries.push_back(Entry::Item(item));
        g.pushes += 1;
        self.not_empty.notify_one();
        Ok(())
    }

    /// Closes one producer; the last close enqueues the sentinel. Closing
    /// twice is a no-op.
    pub fn close_producer(&self, producer: usize) -> Result<(), FifoError> {
        let mut g = self.inner.lock();
        if !g.registered.contains(&producer) {
            return Err(FifoError::UnknownProducer(producer));
        }
        if g.open.remove(&producer) && g.open.is_empty() && !g.end_pushed {
            // never blocks, so a closing producer cannot deadlock on a full queue
            g.entries.push_back(Entry::End);
            g.end_pushed = true;
            g.pushes += 1;
            self.not_empty.notify_all();
        }
        Ok(())
    }

    /// Blocks until an item or the sentinel is available. `None` is the sentinel.
    pub fn pop(&self) -> Result<Option<T>, FifoError> {
        let mut g = self.inner.lock();
        self.wait_front(&mut g)?;
        let entry = g.entries.pop_front().ok_or(FifoError::Drained)?;
        g.pops += 1;
        self.not_full.notify_one();
        match entry {
            Entry::Item(item) => Ok(Some(item)),
            Entry::End => {
                g.end_popped = true;
                Ok(None)
            }
        }
    }

    pub fn counters(&self) -> (u64, u64) {
        let g = self.inner.lock();
        (g.pushes, g.pops)
    }

    /// Wakes every waiter with [`FifoError::Aborted`].
    pub fn abort(&self) {
        let mut g = self.inner.lock();
        g.aborted = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    fn wait_front(&self, g: &mut parking_lot::MutexGuard<'_, Inner<T>>) -> Result<(), FifoError> {
        loop {
            if g.aborted {
                return Err(FifoError::Aborted);
            }
            if g.end_popped {
                return Err(FifoError::Drained);
            }
            if !g.entries.is_empty() {
                return Ok(());
            }
            self.not_empty.wait(g);
        }
    }
}

impl<T: Clone> Fifo<T> {
    /// Like [`Fifo::pop`] but leaves the front entry in place.
    pub fn peek(&self) -> Result<Option<T>, FifoError> {
        let mut g = self.inner.lock();
        self.wait_front(&mut g)?;
        match g.entries.front() {
            Some(Entry::Item(item)) => Ok(Some(item.clone())),
            Some(Entry::End) => Ok(None),
            None => Err(FifoError::Drained),
        }
    }
}
