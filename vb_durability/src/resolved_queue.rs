//! Hand-over queue between resolution and commit/abort application
//! 裁决与提交/中止执行之间的交接队列
//!
//! Producers push while holding the monitor state lock. The single consumer
//! holds only the consumer lock, so the state lock and the hash-table lock
//! are never held together.
//! 生产者在持有监视器状态锁时入队；唯一消费者只持有消费锁，
//! 因此状态锁与哈希表锁从不同时持有。

use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};
use vb_base::{Monotonic, Seqno};

use crate::{Result, SyncWrite};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
  Commit,
  Abort,
}

#[derive(Debug)]
pub struct Resolved {
  pub write: SyncWrite,
  pub resolution: Resolution,
}

struct Inner {
  queue: VecDeque<Resolved>,
  high_committed: Monotonic,
  high_aborted: Monotonic,
}

/// Proof of holding the consumer lock / 持有消费锁的凭证
pub struct ConsumerGuard<'a>(#[allow(dead_code)] MutexGuard<'a, ()>);

pub struct ResolvedQueue {
  inner: Mutex<Inner>,
  consumer: Mutex<()>,
}

impl ResolvedQueue {
  pub fn new(high_enqueued: Seqno) -> Self {
    Self {
      inner: Mutex::new(Inner {
        queue: VecDeque::new(),
        high_committed: Monotonic::new("resolved_queue_commit", high_enqueued),
        high_aborted: Monotonic::new("resolved_queue_abort", high_enqueued),
      }),
      consumer: Mutex::new(()),
    }
  }

  /// Commits and aborts are each pushed in strictly increasing seqno order.
  /// An abort may overtake an older commit still waiting for its majority.
  /// 提交与中止各自按严格递增的序列号入队；中止可越过仍在等待多数的较旧提交。
  pub fn enqueue(&self, write: SyncWrite, resolution: Resolution) -> Result<()> {
    let mut inner = self.inner.lock();
    match resolution {
      Resolution::Commit => inner.high_committed.set(write.seqno())?,
      Resolution::Abort => inner.high_aborted.set(write.seqno())?,
    }
    inner.queue.push_back(Resolved { write, resolution });
    Ok(())
  }

  pub fn lock_consumer(&self) -> ConsumerGuard<'_> {
    ConsumerGuard(self.consumer.lock())
  }

  /// Pop the oldest entry / 弹出最旧的条目
  pub fn try_dequeue(&self, _guard: &ConsumerGuard<'_>) -> Option<Resolved> {
    self.inner.lock().queue.pop_front()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.inner.lock().queue.len()
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.inner.lock().queue.is_empty()
  }

  #[inline]
  pub fn high_enqueued(&self) -> Seqno {
    let inner = self.inner.lock();
    inner.high_committed.get().max(inner.high_aborted.get())
  }
}
