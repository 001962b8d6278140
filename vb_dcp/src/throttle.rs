//! Replication throttle / 复制限流

use std::sync::{
  Arc,
  atomic::{AtomicUsize, Ordering},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleStatus {
  /// Drop the connection / 断开连接
  Disconnect,
  /// Accept but defer / 接收但延后
  Pause,
  Process,
}

/// Consulted on every inbound message / 每条入站消息都会咨询
pub trait ReplicationThrottle: Send + Sync {
  fn status(&self) -> ThrottleStatus;
}

/// Throttle on shared memory usage against a quota
/// 按共享内存用量与配额限流
#[derive(Debug, Clone)]
pub struct MemoryThrottle {
  used: Arc<AtomicUsize>,
  quota: usize,
  /// Percent of quota replication may fill / 复制可占用配额的百分比
  threshold_pct: usize,
  disconnect_when_full: bool,
}

impl MemoryThrottle {
  pub fn new(used: Arc<AtomicUsize>, quota: usize, threshold_pct: usize) -> Self {
    Self {
      used,
      quota,
      threshold_pct: threshold_pct.min(100),
      disconnect_when_full: false,
    }
  }

  #[inline]
  pub fn disconnect_when_full(mut self, on: bool) -> Self {
    self.disconnect_when_full = on;
    self
  }

  #[inline]
  pub fn has_memory(&self) -> bool {
    let used = self.used.load(Ordering::Relaxed);
    used.saturating_mul(100) < self.quota.saturating_mul(self.threshold_pct)
  }
}

impl ReplicationThrottle for MemoryThrottle {
  fn status(&self) -> ThrottleStatus {
    if self.has_memory() {
      ThrottleStatus::Process
    } else if self.disconnect_when_full {
      ThrottleStatus::Disconnect
    } else {
      ThrottleStatus::Pause
    }
  }
}
