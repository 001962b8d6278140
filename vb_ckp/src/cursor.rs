//! Named read position into the checkpoint queue
//! 检查点队列中的具名读取位置

use std::{cmp::Ordering, collections::HashMap};

use hipstr::HipStr;
use vb_base::{CheckpointId, Seqno};

use crate::checkpoint::Pos;

pub type CursorName = HipStr<'static>;

/// Flusher read position, exists for the vBucket lifetime
/// 刷盘读取位置，与 vBucket 同生命周期
pub const PERSISTENCE_CURSOR: &str = "persistence";

pub(crate) type CursorMap = HashMap<CursorName, CheckpointCursor>;

/// Cursor points at the last item it has processed
/// 游标指向其最后处理的条目
#[derive(Debug, Clone)]
pub struct CheckpointCursor {
  pub(crate) name: CursorName,
  pub(crate) ckpt_id: CheckpointId,
  pub(crate) pos: Pos,
  /// Seqno of the item at `pos` / `pos` 处条目的序列号
  pub(crate) seqno: Seqno,
  pub(crate) visits: u64,
}

impl CheckpointCursor {
  pub(crate) fn new(name: CursorName, ckpt_id: CheckpointId, pos: Pos, seqno: Seqno) -> Self {
    Self {
      name,
      ckpt_id,
      pos,
      seqno,
      visits: 1,
    }
  }

  #[inline]
  pub fn name(&self) -> &str {
    &self.name
  }

  #[inline]
  pub fn checkpoint_id(&self) -> CheckpointId {
    self.ckpt_id
  }

  #[inline]
  pub fn seqno(&self) -> Seqno {
    self.seqno
  }

  /// Checkpoints entered so far / 已进入的检查点数
  #[inline]
  pub fn visits(&self) -> u64 {
    self.visits
  }

  #[inline]
  pub fn is_persistence(&self) -> bool {
    self.name == PERSISTENCE_CURSOR
  }

  #[inline]
  pub(crate) fn move_to(&mut self, pos: Pos, seqno: Seqno) {
    self.pos = pos;
    self.seqno = seqno;
  }

  #[inline]
  fn key(&self) -> (CheckpointId, Seqno, Pos) {
    (self.ckpt_id, self.seqno, self.pos)
  }
}

impl PartialEq for CheckpointCursor {
  fn eq(&self, other: &Self) -> bool {
    self.key() == other.key()
  }
}

impl Eq for CheckpointCursor {}

impl PartialOrd for CheckpointCursor {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for CheckpointCursor {
  fn cmp(&self, other: &Self) -> Ordering {
    self.key().cmp(&other.key())
  }
}
