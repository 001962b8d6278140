//! Snapshot range and checkpoint type / 快照范围与检查点类型

use std::fmt;

use vb_base::Seqno;

/// Inclusive seqno range of a snapshot / 快照的闭区间序列号范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotRange {
  pub start: Seqno,
  pub end: Seqno,
}

impl SnapshotRange {
  #[inline]
  pub const fn new(start: Seqno, end: Seqno) -> Self {
    Self { start, end }
  }
}

impl fmt::Display for SnapshotRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{{{},{}}}", self.start, self.end)
  }
}

/// Resume point for a reconnecting stream / 重连流的恢复点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SnapshotInfo {
  /// Last seqno queued / 最后入队的序列号
  pub start: Seqno,
  pub range: SnapshotRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointType {
  #[default]
  Memory,
  Disk,
  /// First disk snapshot into an empty vBucket / 空 vBucket 的首个磁盘快照
  InitialDisk,
}

impl CheckpointType {
  #[inline]
  pub const fn is_disk(self) -> bool {
    matches!(self, Self::Disk | Self::InitialDisk)
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Memory => "Memory",
      Self::Disk => "Disk",
      Self::InitialDisk => "InitialDisk",
    }
  }
}

impl fmt::Display for CheckpointType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointState {
  #[default]
  Open,
  Closed,
}
