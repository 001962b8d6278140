//! Core type system / 核心类型系统
//! NewType pattern prevents primitive type misuse / NewType 模式防止原生类型混用

use std::fmt;

use hipstr::HipStr;
use serde::{Deserialize, Serialize};

/// Sequence number, monotonic within a vBucket (0 = unassigned)
/// 序列号，vBucket 内单调递增（0 = 未分配）
pub type Seqno = u64;

/// Compare-and-swap value / CAS 值
pub type Cas = u64;

/// Checkpoint id, strictly increasing per vBucket
/// 检查点 id，每个 vBucket 内严格递增
pub type CheckpointId = u64;

/// Replication node identity / 复制节点标识
pub type NodeName = HipStr<'static>;

/// 16-bit vBucket id / 16 位 vBucket id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[repr(transparent)]
pub struct Vbid(pub u16);

impl Vbid {
  #[inline]
  pub const fn new(id: u16) -> Self {
    Self(id)
  }
}

impl fmt::Display for Vbid {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "vb:{}", self.0)
  }
}

/// Opaque client connection token, used to notify write completion
/// 不透明的客户端连接令牌，用于通知写入完成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Cookie(pub u64);

/// vBucket state / vBucket 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VBucketState {
  Active,
  #[default]
  Replica,
  Pending,
  Dead,
}

impl VBucketState {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::Replica => "replica",
      Self::Pending => "pending",
      Self::Dead => "dead",
    }
  }

  #[inline]
  pub const fn as_u8(self) -> u8 {
    self as u8
  }
}

impl fmt::Display for VBucketState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}
