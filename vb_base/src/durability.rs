//! Durability requirements / 持久性要求

use std::fmt;

use serde::{Deserialize, Serialize};

/// Durability level of a synchronous write / 同步写的持久性级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Level {
  #[default]
  None,
  /// Majority of nodes hold it in memory / 多数节点内存中持有
  Majority,
  /// Majority in memory, persisted on the active / 多数在内存，主节点已持久化
  MajorityAndPersistOnMaster,
  /// Persisted on a majority of nodes / 多数节点已持久化
  PersistToMajority,
}

impl Level {
  /// Active must persist before acking / 主节点确认前必须持久化
  #[inline]
  pub const fn persist_on_active(self) -> bool {
    matches!(self, Self::MajorityAndPersistOnMaster | Self::PersistToMajority)
  }

  /// Replica must persist before acking / 副本确认前必须持久化
  #[inline]
  pub const fn persist_on_replica(self) -> bool {
    matches!(self, Self::PersistToMajority)
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      Self::None => "none",
      Self::Majority => "majority",
      Self::MajorityAndPersistOnMaster => "majorityAndPersistActive",
      Self::PersistToMajority => "persistToMajority",
    }
  }
}

impl fmt::Display for Level {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// SyncWrite timeout / 同步写超时
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Timeout {
  /// Use the bucket default / 使用默认值
  #[default]
  Default,
  /// Never expires (warmup / promotion) / 永不过期（预热 / 提升）
  Infinite,
  Millis(u32),
}

impl Timeout {
  #[inline]
  pub const fn is_infinite(self) -> bool {
    matches!(self, Self::Infinite)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Requirements {
  pub level: Level,
  pub timeout: Timeout,
}

impl Requirements {
  #[inline]
  pub const fn new(level: Level, timeout: Timeout) -> Self {
    Self { level, timeout }
  }

  #[inline]
  pub const fn is_durable(&self) -> bool {
    !matches!(self.level, Level::None)
  }
}
