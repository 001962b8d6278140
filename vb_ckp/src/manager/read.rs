//! Cursor registration and item retrieval
//! 游标注册与条目读取

use std::sync::Arc;

use log::debug;
use vb_base::{CheckpointId, QueuedItem, Seqno};

use super::CheckpointManager;
use crate::{
  Checkpoint, Error, Result,
  cursor::{CheckpointCursor, CursorName, PERSISTENCE_CURSOR},
  snapshot::{CheckpointType, SnapshotRange},
};

/// Labels of one checkpoint a batch read from / 批次所读检查点的标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointRange {
  pub id: CheckpointId,
  pub range: SnapshotRange,
  pub visible_end: Seqno,
  pub hcs: Option<Seqno>,
  pub ckpt_type: CheckpointType,
  pub history: bool,
}

impl CheckpointRange {
  fn of(c: &Checkpoint) -> Self {
    Self {
      id: c.id(),
      range: c.snapshot_range(),
      visible_end: c.visible_snapshot_end(),
      hcs: c.high_completed_seqno(),
      ckpt_type: c.checkpoint_type(),
      history: c.history(),
    }
  }
}

#[derive(Debug, Clone, Default)]
pub struct ItemsForCursor {
  pub items: Vec<QueuedItem>,
  pub ranges: Vec<CheckpointRange>,
  /// Type of the first checkpoint read / 首个被读检查点的类型
  pub checkpoint_type: CheckpointType,
  pub hcs: Option<Seqno>,
  pub history: bool,
  pub more_available: bool,
}

impl ItemsForCursor {
  /// Highest seqno of the batch, meta items included / 批次最高序列号（含元条目）
  #[inline]
  pub fn high_seqno(&self) -> Option<Seqno> {
    self.items.iter().map(|qi| qi.by_seqno).max()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterResult {
  /// Seqno the cursor reads from / 游标开始读取的序列号
  pub seqno: Seqno,
  /// Items before `seqno` must come from disk / `seqno` 之前的条目须从磁盘补齐
  pub try_backfill: bool,
  pub checkpoint_id: CheckpointId,
}

impl CheckpointManager {
  /// Place a cursor after `last_seqno`, replacing any cursor of the same name
  /// 将游标放在 `last_seqno` 之后，替换同名游标
  pub fn register_cursor_by_seqno(&self, name: &str, last_seqno: Seqno) -> RegisterResult {
    let mut inner = self.inner.lock();
    if let Some(old) = inner.cursors.remove(name) {
      inner.unpin(old.ckpt_id);
    }
    let want = last_seqno + 1;

    let chosen = inner
      .iter()
      .filter(|c| c.minimum_cursor_seqno() <= want)
      .last()
      .map(Checkpoint::id);
    let (id, try_backfill) = match chosen {
      Some(id) => (id, false),
      None => (
        inner
          .closed
          .front()
          .map_or(inner.open.id(), Checkpoint::id),
        true,
      ),
    };

    let Some(ckpt) = inner.get(id) else {
      return RegisterResult {
        seqno: want,
        try_backfill: true,
        checkpoint_id: id,
      };
    };
    let (pos, seqno) = ckpt.position_before_seqno(want);
    let from = want.max(ckpt.minimum_cursor_seqno());

    let name = CursorName::from(name);
    debug!(
      "{} register cursor {name} at ckpt {id} seqno {from} backfill {try_backfill}",
      self.vbid
    );
    inner
      .cursors
      .insert(name.clone(), CheckpointCursor::new(name, id, pos, seqno));
    inner.pin(id);
    RegisterResult {
      seqno: from,
      try_backfill,
      checkpoint_id: id,
    }
  }

  /// Remove a cursor and unpin its checkpoint / 移除游标并解除其检查点的引用
  pub fn remove_cursor(&self, name: &str) -> bool {
    let mut inner = self.inner.lock();
    match inner.cursors.remove(name) {
      Some(c) => {
        inner.unpin(c.ckpt_id);
        true
      }
      None => false,
    }
  }

  /// Read items after the cursor, up to about `limit`, and advance it
  /// 读取游标之后约 `limit` 个条目并前移游标
  ///
  /// Stops at a checkpoint boundary once the limit is reached and never
  /// mixes Memory with Disk checkpoints in one batch.
  /// 达到上限后在检查点边界停止，同一批次不混合内存与磁盘检查点。
  pub fn get_items_for_cursor(&self, name: &str, limit: usize) -> Result<ItemsForCursor> {
    let mut inner = self.inner.lock();
    let mut cur = inner
      .cursors
      .get(name)
      .cloned()
      .ok_or_else(|| Error::CursorNotFound(name.to_owned()))?;
    let mut out = ItemsForCursor::default();
    let mut disk: Option<bool> = None;

    while let Some(ckpt) = inner.get(cur.ckpt_id) {
      let mut took = false;
      while let Some((p, qi)) = ckpt.next_after(cur.pos) {
        cur.move_to(p, qi.by_seqno);
        out.items.push(Arc::clone(qi));
        took = true;
      }
      if took {
        if disk.is_none() {
          disk = Some(ckpt.checkpoint_type().is_disk());
          out.checkpoint_type = ckpt.checkpoint_type();
          out.hcs = ckpt.high_completed_seqno();
          out.history = ckpt.history();
        }
        out.ranges.push(CheckpointRange::of(ckpt));
      }

      let next_id = cur.ckpt_id + 1;
      let Some(next) = inner.get(next_id) else {
        break;
      };
      if !out.items.is_empty()
        && (out.items.len() >= limit || disk != Some(next.checkpoint_type().is_disk()))
      {
        out.more_available = true;
        break;
      }
      let (p, s) = next.head_position();
      let prev = cur.ckpt_id;
      cur.ckpt_id = next_id;
      cur.move_to(p, s);
      cur.visits += 1;
      inner.unpin(prev);
      inner.pin(next_id);
    }

    if let Some(c) = inner.cursors.get_mut(name) {
      *c = cur;
    }
    Ok(out)
  }

  #[inline]
  pub fn get_items_for_persistence(&self, limit: usize) -> Result<ItemsForCursor> {
    self.get_items_for_cursor(PERSISTENCE_CURSOR, limit)
  }

  /// Non-meta items the cursor has yet to read / 游标尚未读取的非元条目数
  pub fn get_num_items_for_cursor(&self, name: &str) -> Result<usize> {
    let inner = self.inner.lock();
    let cur = inner
      .cursors
      .get(name)
      .ok_or_else(|| Error::CursorNotFound(name.to_owned()))?;
    let here = inner
      .get(cur.ckpt_id)
      .map_or(0, |c| c.num_items_after(cur.pos));
    let later: usize = inner
      .iter()
      .filter(|c| c.id() > cur.ckpt_id)
      .map(Checkpoint::num_items)
      .sum();
    Ok(here + later)
  }

  #[inline]
  pub fn cursor(&self, name: &str) -> Option<CheckpointCursor> {
    self.inner.lock().cursors.get(name).cloned()
  }

  /// Seqno of the last item the flusher read / 刷盘器最后读取条目的序列号
  #[inline]
  pub fn persistence_cursor_seqno(&self) -> Option<Seqno> {
    self
      .inner
      .lock()
      .cursors
      .get(PERSISTENCE_CURSOR)
      .map(CheckpointCursor::seqno)
  }

  #[inline]
  pub fn num_cursors(&self) -> usize {
    self.inner.lock().cursors.len()
  }
}
