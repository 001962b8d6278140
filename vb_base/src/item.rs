//! Queued mutation model
//! 排队变更模型

use std::{fmt, mem::size_of, sync::Arc};

use bytes::Bytes;
use hipstr::HipByt;

use crate::{Cas, Requirements, Seqno, VBucketState};

/// Document key (cheap clone, inline for short keys)
/// 文档键（廉价克隆，短键内联）
pub type DocKey = HipByt<'static>;

/// Item shared by the checkpoint queue and every cursor
/// 检查点队列与所有游标共享的条目
pub type QueuedItem = Arc<Item>;

#[inline]
pub fn doc_key(key: impl AsRef<[u8]>) -> DocKey {
  HipByt::from(key.as_ref().to_vec())
}

/// Operation kind of a queued item / 排队条目的操作类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueOp {
  Mutation,
  PendingSyncWrite,
  CommitSyncWrite,
  AbortSyncWrite,
  CheckpointStart,
  CheckpointEnd,
  SetVbucketState,
  SystemEvent,
  /// Dummy head of every checkpoint / 每个检查点的哑元头
  Empty,
}

impl QueueOp {
  /// Meta items carry no key and bypass de-duplication
  /// 元条目不带键，不参与去重
  #[inline]
  pub const fn is_meta(self) -> bool {
    matches!(
      self,
      Self::Empty | Self::CheckpointStart | Self::CheckpointEnd | Self::SetVbucketState
    )
  }

  #[inline]
  pub const fn is_sync_write(self) -> bool {
    matches!(
      self,
      Self::PendingSyncWrite | Self::CommitSyncWrite | Self::AbortSyncWrite
    )
  }

  /// Lives in the prepared namespace / 属于预备命名空间
  #[inline]
  pub const fn is_prepared_namespace(self) -> bool {
    matches!(self, Self::PendingSyncWrite | Self::AbortSyncWrite)
  }

  /// Visible to readers once queued / 入队后对读者可见
  #[inline]
  pub const fn is_visible(self) -> bool {
    matches!(self, Self::Mutation | Self::CommitSyncWrite | Self::SystemEvent)
  }

  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Mutation => "mutation",
      Self::PendingSyncWrite => "pending_sync_write",
      Self::CommitSyncWrite => "commit_sync_write",
      Self::AbortSyncWrite => "abort_sync_write",
      Self::CheckpointStart => "checkpoint_start",
      Self::CheckpointEnd => "checkpoint_end",
      Self::SetVbucketState => "set_vbucket_state",
      Self::SystemEvent => "system_event",
      Self::Empty => "empty",
    }
  }
}

impl fmt::Display for QueueOp {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// A single change to a vBucket / vBucket 的单个变更
#[derive(Debug, Clone)]
pub struct Item {
  pub key: DocKey,
  pub value: Bytes,
  pub by_seqno: Seqno,
  pub rev_seqno: u64,
  pub cas: Cas,
  pub op: QueueOp,
  pub deleted: bool,
  /// Set for PendingSyncWrite only / 仅 PendingSyncWrite 设置
  pub durability: Option<Requirements>,
  /// Seqno of the prepare a commit/abort completes / 提交/中止对应的预备序列号
  pub prepare_seqno: Seqno,
  /// Payload of a SetVbucketState meta item / SetVbucketState 元条目的负载
  pub vb_state: Option<VBucketState>,
}

impl Item {
  fn base(key: DocKey, value: Bytes, op: QueueOp) -> Self {
    Self {
      key,
      value,
      by_seqno: 0,
      rev_seqno: 1,
      cas: 0,
      op,
      deleted: false,
      durability: None,
      prepare_seqno: 0,
      vb_state: None,
    }
  }

  pub fn mutation(key: impl AsRef<[u8]>, value: impl Into<Bytes>) -> Self {
    Self::base(doc_key(key), value.into(), QueueOp::Mutation)
  }

  pub fn deletion(key: impl AsRef<[u8]>) -> Self {
    let mut it = Self::base(doc_key(key), Bytes::new(), QueueOp::Mutation);
    it.deleted = true;
    it
  }

  pub fn pending(key: impl AsRef<[u8]>, value: impl Into<Bytes>, reqs: Requirements) -> Self {
    let mut it = Self::base(doc_key(key), value.into(), QueueOp::PendingSyncWrite);
    it.durability = Some(reqs);
    it
  }

  pub fn commit(key: DocKey, value: Bytes, prepare_seqno: Seqno) -> Self {
    let mut it = Self::base(key, value, QueueOp::CommitSyncWrite);
    it.prepare_seqno = prepare_seqno;
    it
  }

  pub fn abort(key: DocKey, prepare_seqno: Seqno) -> Self {
    let mut it = Self::base(key, Bytes::new(), QueueOp::AbortSyncWrite);
    it.prepare_seqno = prepare_seqno;
    it.deleted = true;
    it
  }

  pub fn system_event(key: impl AsRef<[u8]>, value: impl Into<Bytes>) -> Self {
    Self::base(doc_key(key), value.into(), QueueOp::SystemEvent)
  }

  /// Keyless meta item / 无键元条目
  pub fn meta(op: QueueOp, by_seqno: Seqno) -> Self {
    let mut it = Self::base(DocKey::new(), Bytes::new(), op);
    it.by_seqno = by_seqno;
    it
  }

  pub fn set_vbucket_state(state: VBucketState, by_seqno: Seqno) -> Self {
    let mut it = Self::meta(QueueOp::SetVbucketState, by_seqno);
    it.vb_state = Some(state);
    it
  }

  #[inline]
  pub fn with_seqno(mut self, seqno: Seqno) -> Self {
    self.by_seqno = seqno;
    self
  }

  #[inline]
  pub fn with_cas(mut self, cas: Cas) -> Self {
    self.cas = cas;
    self
  }

  #[inline]
  pub fn with_rev_seqno(mut self, rev: u64) -> Self {
    self.rev_seqno = rev;
    self
  }

  #[inline]
  pub fn with_deleted(mut self, deleted: bool) -> Self {
    self.deleted = deleted;
    self
  }

  /// Committed namespace (mutations, commits, system events)
  /// 已提交命名空间（变更、提交、系统事件）
  #[inline]
  pub fn is_committed(&self) -> bool {
    !self.op.is_prepared_namespace()
  }

  #[inline]
  pub fn is_meta(&self) -> bool {
    self.op.is_meta()
  }

  /// Approximate memory footprint in bytes / 近似内存占用（字节）
  #[inline]
  pub fn size(&self) -> usize {
    size_of::<Self>() + self.key.len() + self.value.len()
  }

  #[inline]
  pub fn into_queued(self) -> QueuedItem {
    Arc::new(self)
  }
}
