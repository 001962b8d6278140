//! Engine status codes / 引擎状态码
//!
//! Expected outcomes are values, not errors: callers branch on them.
//! 预期结果是值而非错误：调用方据此分支。

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
  Success,
  /// Accepted but deferred, retry later / 已接受但延后，稍后重试
  TempFail,
  NoMemory,
  NotMyVbucket,
  /// Seqno or snapshot outside the expected range / 序列号或快照超出预期范围
  OutOfRange,
  Disconnect,
  KeyNotFound,
  KeyExists,
  InvalidArgs,
  /// Durable write accepted, completion notified later / 持久写已接受，稍后通知完成
  WouldBlock,
  SyncWriteInProgress,
  SyncWriteAmbiguous,
  DurabilityImpossible,
}

impl Status {
  #[inline]
  pub const fn is_success(self) -> bool {
    matches!(self, Self::Success)
  }

  /// Recoverable by retrying later / 可稍后重试恢复
  #[inline]
  pub const fn is_retryable(self) -> bool {
    matches!(self, Self::TempFail | Self::NoMemory)
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Success => "success",
      Self::TempFail => "temporary_failure",
      Self::NoMemory => "no_memory",
      Self::NotMyVbucket => "not_my_vbucket",
      Self::OutOfRange => "out_of_range",
      Self::Disconnect => "disconnect",
      Self::KeyNotFound => "no_such_key",
      Self::KeyExists => "key_already_exists",
      Self::InvalidArgs => "invalid_arguments",
      Self::WouldBlock => "would_block",
      Self::SyncWriteInProgress => "sync_write_in_progress",
      Self::SyncWriteAmbiguous => "sync_write_ambiguous",
      Self::DurabilityImpossible => "durability_impossible",
    }
  }
}

impl fmt::Display for Status {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
