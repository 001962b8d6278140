//! The vBucket a passive stream writes into
//! 被动流写入的 vBucket

use std::sync::Arc;

use vb_base::{DocKey, Item, Seqno, Status, VBucketState, Vbid};
use vb_ckp::CheckpointManager;
use vb_durability::SeqnoAckSink;

/// Apply functions return a [`Status`]; retryable ones make the stream
/// buffer and try again later.
/// 应用函数返回 [`Status`]；可重试的状态会使流缓冲并稍后重试。
pub trait ReplicaVBucket: Send + Sync {
  fn vbid(&self) -> Vbid;
  fn high_seqno(&self) -> Seqno;
  fn checkpoint_manager(&self) -> &CheckpointManager;

  fn set_with_meta(&self, item: &Item) -> Status;
  /// Deletions and expirations / 删除与过期
  fn delete_with_meta(&self, item: &Item) -> Status;
  fn prepare(&self, item: &Item) -> Status;
  fn commit(&self, key: &DocKey, prepare_seqno: Seqno, commit_seqno: Seqno) -> Status;
  fn abort(&self, key: &DocKey, prepare_seqno: Seqno, abort_seqno: Seqno) -> Status;
  fn system_event(&self, item: &Item) -> Status;
  fn set_state(&self, state: VBucketState) -> Status;

  /// Last item of a snapshot applied / 快照最后一个条目已应用
  fn notify_snapshot_end(&self, seqno: Seqno, disk: bool) -> vb_durability::Result<()>;
  fn set_seqno_ack_sink(&self, sink: Option<Arc<dyn SeqnoAckSink>>);

  fn is_receiving_initial_disk_snapshot(&self) -> bool;
  fn set_receiving_initial_disk_snapshot(&self, on: bool);
}
