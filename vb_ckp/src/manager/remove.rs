//! Checkpoint removal and item expel
//! 检查点删除与条目驱逐

use std::collections::VecDeque;

use log::debug;
use vb_base::{CheckpointId, VBucketState};

use super::{CheckpointManager, Inner};
use crate::{Checkpoint, Result, cursor::CheckpointCursor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemoveResult {
  /// Checkpoints destroyed / 销毁的检查点数
  pub count: usize,
  /// Non-meta items released with them / 随之释放的非元条目数
  pub items: usize,
  pub new_checkpoint_created: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExpelResult {
  pub count: usize,
  pub bytes: usize,
  pub checkpoint_id: CheckpointId,
}

fn find_mut<'a>(
  closed: &'a mut VecDeque<Checkpoint>,
  open: &'a mut Checkpoint,
  id: CheckpointId,
) -> Option<&'a mut Checkpoint> {
  if id == open.id() {
    return Some(open);
  }
  let front = closed.front()?.id();
  closed.get_mut(id.checked_sub(front)? as usize)
}

impl CheckpointManager {
  /// Destroy up to `limit` closed, unreferenced checkpoints, oldest first
  /// 从最旧开始销毁至多 `limit` 个已关闭且无引用的检查点
  ///
  /// Only the unlink runs under the queue lock; the checkpoints are dropped
  /// after it is released.
  /// 仅摘除操作持有队列锁，检查点在释放锁后析构。
  pub fn remove_closed_unref_checkpoints(&self, limit: usize) -> RemoveResult {
    let (removed, new_checkpoint_created) = {
      let mut inner = self.inner.lock();
      let mut created = false;
      if inner.vb_state == VBucketState::Active && inner.open.num_items() >= self.conf.max_items {
        let spec = inner.active_spec();
        inner.add_checkpoint(spec, &self.mem_cb);
        created = true;
      }
      let mut removed = Vec::new();
      while removed.len() < limit && inner.closed.front().is_some_and(|c| c.num_cursors() == 0) {
        if let Some(c) = inner.closed.pop_front() {
          removed.push(c);
        }
      }
      (removed, created)
    };

    let r = RemoveResult {
      count: removed.len(),
      items: removed.iter().map(Checkpoint::num_items).sum(),
      new_checkpoint_created,
    };
    drop(removed);
    if r.count > 0 {
      debug!("{} removed {} checkpoints, {} items", self.vbid, r.count, r.items);
    }
    r
  }

  /// Expel items every cursor has passed in the lowest cursor's checkpoint
  /// 在最低游标所在检查点中驱逐所有游标都已越过的条目
  pub fn expel_unreferenced_checkpoint_items(&self) -> Result<ExpelResult> {
    if !self.conf.expel {
      return Ok(ExpelResult::default());
    }
    let (expelled, id) = {
      let mut inner = self.inner.lock();
      let Some(lowest) = inner.cursors.values().min().cloned() else {
        return Ok(ExpelResult::default());
      };
      let Inner {
        closed,
        open,
        cursors,
        ..
      } = &mut *inner;
      let Some(ckpt) = find_mut(closed, open, lowest.ckpt_id) else {
        return Ok(ExpelResult::default());
      };
      let (start, _) = ckpt.start_position();
      let mut upto = lowest.pos;
      if upto >= ckpt.last_pos() {
        match ckpt.prev_pos(upto) {
          Some(p) => upto = p,
          None => return Ok(ExpelResult::default()),
        }
      }
      if upto <= start {
        return Ok(ExpelResult::default());
      }
      (ckpt.expel_items(upto, cursors)?, ckpt.id())
    };

    let r = ExpelResult {
      count: expelled.len(),
      bytes: expelled.iter().map(|qi| qi.size()).sum(),
      checkpoint_id: id,
    };
    drop(expelled);
    debug!(
      "{} expelled {} items ({} bytes) from checkpoint {id}",
      self.vbid, r.count, r.bytes
    );
    Ok(r)
  }

  /// Lowest cursor by (checkpoint, seqno, position) / 按（检查点，序列号，位置）的最低游标
  pub fn lowest_cursor(&self) -> Option<CheckpointCursor> {
    self.inner.lock().cursors.values().min().cloned()
  }
}
