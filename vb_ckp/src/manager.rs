//! Checkpoint manager: checkpoint list and cursor registry of one vBucket
//! 检查点管理器：单个 vBucket 的检查点列表与游标注册表

mod read;
mod remove;
mod stat;

use std::{
  collections::VecDeque,
  iter,
  sync::{
    Arc,
    atomic::{AtomicIsize, Ordering},
  },
};

use log::{debug, error};
use parking_lot::Mutex;
pub use read::{CheckpointRange, ItemsForCursor, RegisterResult};
pub use remove::{ExpelResult, RemoveResult};
use vb_base::{CheckpointId, Hlc, Item, QueuedItem, Seqno, VBucketState, Vbid};

use crate::{
  Checkpoint, Conf, Error, ParsedConf, Result,
  checkpoint::{MemCallback, QueueDirtyResult, QueueDirtyStatus},
  cursor::{CheckpointCursor, CursorMap, CursorName, PERSISTENCE_CURSOR},
  snapshot::{CheckpointType, SnapshotInfo, SnapshotRange},
};

/// Woken when items become available to persist / 有条目可持久化时被唤醒
pub trait FlusherNotify: Send + Sync {
  fn notify_flush(&self, vbid: Vbid);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerateBySeqno {
  Yes,
  No,
}

/// Snapshot labels for a new or relabeled checkpoint
/// 新建或重标记检查点的快照标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSpec {
  pub range: SnapshotRange,
  pub visible_end: Seqno,
  pub hcs: Option<Seqno>,
  pub ckpt_type: CheckpointType,
  pub history: bool,
}

/// Outcome of queueing one item / 单个条目入队结果
#[derive(Debug, Clone)]
pub struct Queued {
  pub item: QueuedItem,
  pub status: QueueDirtyStatus,
  pub size_delta: isize,
}

pub(crate) struct Inner {
  closed: VecDeque<Checkpoint>,
  open: Checkpoint,
  cursors: CursorMap,
  last_by_seqno: Seqno,
  max_visible_seqno: Seqno,
  vb_state: VBucketState,
}

impl Inner {
  #[inline]
  fn iter(&self) -> impl Iterator<Item = &Checkpoint> {
    self.closed.iter().chain(iter::once(&self.open))
  }

  fn get(&self, id: CheckpointId) -> Option<&Checkpoint> {
    if id == self.open.id() {
      return Some(&self.open);
    }
    let front = self.closed.front()?.id();
    self.closed.get(id.checked_sub(front)? as usize)
  }

  fn get_mut(&mut self, id: CheckpointId) -> Option<&mut Checkpoint> {
    if id == self.open.id() {
      return Some(&mut self.open);
    }
    let front = self.closed.front()?.id();
    self.closed.get_mut(id.checked_sub(front)? as usize)
  }

  #[inline]
  fn len(&self) -> usize {
    self.closed.len() + 1
  }

  fn pin(&mut self, id: CheckpointId) {
    if let Some(c) = self.get_mut(id) {
      c.num_cursors += 1;
    }
  }

  fn unpin(&mut self, id: CheckpointId) {
    if let Some(c) = self.get_mut(id) {
      c.num_cursors = c.num_cursors.saturating_sub(1);
    }
  }

  /// Close the open checkpoint and open a new one / 关闭打开的检查点并新开一个
  fn add_checkpoint(&mut self, spec: SnapshotSpec, mem_cb: &MemCallback) -> CheckpointId {
    let meta_seqno = self.last_by_seqno + 1;
    let id = self.open.id() + 1;
    let next = Checkpoint::new(
      id,
      spec.range,
      spec.visible_end,
      spec.hcs,
      spec.ckpt_type,
      spec.history,
      meta_seqno,
      Some(Arc::clone(mem_cb)),
    );
    let mut prev = std::mem::replace(&mut self.open, next);
    prev.close(meta_seqno);
    self.closed.push_back(prev);
    id
  }

  /// Snapshot labels a fresh active checkpoint starts with
  /// 活跃端新检查点的初始快照标签
  fn active_spec(&self) -> SnapshotSpec {
    let next = self.last_by_seqno + 1;
    SnapshotSpec {
      range: SnapshotRange::new(next, next),
      visible_end: self.max_visible_seqno,
      hcs: None,
      ckpt_type: CheckpointType::Memory,
      history: self.open.history(),
    }
  }

  /// Labels of the open checkpoint, for a replica duplicate retry
  /// 打开检查点的标签，用于副本重复重试
  fn inherited_spec(&self) -> SnapshotSpec {
    SnapshotSpec {
      range: self.open.snapshot_range(),
      visible_end: self.open.visible_snapshot_end(),
      hcs: self.open.high_completed_seqno(),
      ckpt_type: self.open.checkpoint_type(),
      history: self.open.history(),
    }
  }
}

pub struct CheckpointManager {
  vbid: Vbid,
  conf: ParsedConf,
  inner: Mutex<Inner>,
  flusher: Option<Arc<dyn FlusherNotify>>,
  mem_cb: MemCallback,
  mem_overhead: Arc<AtomicIsize>,
}

impl CheckpointManager {
  /// Create with one open Memory checkpoint and the persistence cursor
  /// 创建时带一个打开的内存检查点与持久化游标
  pub fn new(
    vbid: Vbid,
    vb_state: VBucketState,
    last_seqno: Seqno,
    snap: SnapshotRange,
    max_visible_seqno: Seqno,
    conf: &[Conf],
    flusher: Option<Arc<dyn FlusherNotify>>,
  ) -> Self {
    let mem_overhead = Arc::new(AtomicIsize::new(0));
    let mem_cb: MemCallback = {
      let total = Arc::clone(&mem_overhead);
      Arc::new(move |delta: isize| {
        total.fetch_add(delta, Ordering::Relaxed);
      })
    };
    let open = Checkpoint::new(
      1,
      snap,
      max_visible_seqno,
      None,
      CheckpointType::Memory,
      false,
      last_seqno + 1,
      Some(Arc::clone(&mem_cb)),
    );
    let mut inner = Inner {
      closed: VecDeque::new(),
      open,
      cursors: CursorMap::new(),
      last_by_seqno: last_seqno,
      max_visible_seqno,
      vb_state,
    };
    let (pos, seqno) = inner.open.start_position();
    let name = CursorName::from(PERSISTENCE_CURSOR);
    inner
      .cursors
      .insert(name.clone(), CheckpointCursor::new(name, 1, pos, seqno));
    inner.open.num_cursors = 1;

    Self {
      vbid,
      conf: ParsedConf::new(conf),
      inner: Mutex::new(inner),
      flusher,
      mem_cb,
      mem_overhead,
    }
  }

  #[inline]
  pub fn vbid(&self) -> Vbid {
    self.vbid
  }

  #[inline]
  pub fn conf(&self) -> &ParsedConf {
    &self.conf
  }

  /// Queue one item into the open checkpoint / 将条目入队到打开的检查点
  ///
  /// On a duplicate the open checkpoint is closed and the item retried once
  /// in a new one. `hlc` set means a cas is generated.
  /// 遇重复时关闭打开的检查点并在新检查点中重试一次。`hlc` 非空表示生成 cas。
  pub fn queue_dirty(
    &self,
    mut item: Item,
    gen_seqno: GenerateBySeqno,
    hlc: Option<&Hlc>,
  ) -> Result<Queued> {
    let queued = {
      let mut inner = self.inner.lock();
      let active = inner.vb_state == VBucketState::Active;

      if active && inner.open.num_items() >= self.conf.max_items {
        let spec = inner.active_spec();
        let id = inner.add_checkpoint(spec, &self.mem_cb);
        debug!("{} checkpoint full, opened {id}", self.vbid);
      }

      match gen_seqno {
        GenerateBySeqno::Yes => item.by_seqno = inner.last_by_seqno + 1,
        GenerateBySeqno::No => {
          if item.by_seqno <= inner.last_by_seqno {
            let err = Error::SeqnoNotIncreasing {
              vbid: self.vbid,
              last: inner.last_by_seqno,
              new: item.by_seqno,
            };
            error!("{err}");
            return Err(err);
          }
        }
      }
      if let Some(hlc) = hlc {
        item.cas = hlc.next_cas();
      }
      let seqno = item.by_seqno;
      let visible = item.op.is_visible();
      let qi = item.into_queued();

      let r = self.queue_into_open(&mut inner, &qi, active)?;
      inner.last_by_seqno = seqno;
      if active {
        inner.open.set_snapshot_end(seqno);
      }
      if visible {
        inner.max_visible_seqno = seqno;
        if active {
          inner.open.set_visible_end(seqno);
        }
      }
      Queued {
        item: qi,
        status: r.status,
        size_delta: r.size_delta,
      }
    };
    self.notify_flusher();
    Ok(queued)
  }

  fn queue_into_open(
    &self,
    inner: &mut Inner,
    qi: &QueuedItem,
    active: bool,
  ) -> Result<QueueDirtyResult> {
    let Inner { open, cursors, .. } = &mut *inner;
    let r = open.queue_dirty(Arc::clone(qi), cursors)?;
    if r.status.is_success() {
      return Ok(r);
    }

    let spec = if active {
      let mut spec = inner.active_spec();
      spec.range = SnapshotRange::new(qi.by_seqno, qi.by_seqno);
      spec
    } else {
      inner.inherited_spec()
    };
    let id = inner.add_checkpoint(spec, &self.mem_cb);
    debug!("{} duplicate sync write, retry in checkpoint {id}", self.vbid);

    let Inner { open, cursors, .. } = &mut *inner;
    let r = open.queue_dirty(Arc::clone(qi), cursors)?;
    if !r.status.is_success() {
      let err = Error::DuplicateAfterRetry { vbid: self.vbid, id };
      error!("{err}");
      return Err(err);
    }
    Ok(r)
  }

  /// Queue a vBucket state change marker / 入队 vBucket 状态变更标记
  pub fn queue_set_vbucket_state(&self, state: VBucketState) -> Result<()> {
    {
      let mut inner = self.inner.lock();
      let seqno = inner.last_by_seqno + 1;
      let qi = Item::set_vbucket_state(state, seqno).into_queued();
      let Inner { open, cursors, .. } = &mut *inner;
      open.queue_dirty(qi, cursors)?;
      inner.vb_state = state;
    }
    self.notify_flusher();
    Ok(())
  }

  /// Change the state that drives size-based checkpoint creation
  /// 变更驱动按大小建检查点的状态
  pub fn set_vbucket_state(&self, state: VBucketState) {
    self.inner.lock().vb_state = state;
  }

  /// Start a replicated snapshot, reusing an empty open checkpoint
  /// 开始一个复制快照，复用空的打开检查点
  pub fn create_snapshot(
    &self,
    start: Seqno,
    end: Seqno,
    hcs: Option<Seqno>,
    ckpt_type: CheckpointType,
    visible_end: Seqno,
    history: bool,
  ) -> Result<CheckpointId> {
    if end < start {
      return Err(Error::BadSnapshot {
        vbid: self.vbid,
        start,
        end,
      });
    }
    let spec = SnapshotSpec {
      range: SnapshotRange::new(start, end),
      visible_end,
      hcs,
      ckpt_type,
      history,
    };
    let mut inner = self.inner.lock();
    if inner.open.num_items() == 0 && inner.open.num_expelled() == 0 {
      let open = &mut inner.open;
      open.set_snapshot(spec.range, visible_end);
      open.set_type(ckpt_type);
      open.set_hcs(hcs);
      open.set_history(history);
      return Ok(open.id());
    }
    let id = inner.add_checkpoint(spec, &self.mem_cb);
    debug!(
      "{} snapshot {} {ckpt_type} in checkpoint {id}",
      self.vbid, spec.range
    );
    Ok(id)
  }

  /// Widen the open Memory checkpoint / 扩展打开的内存检查点
  pub fn extend_open_checkpoint(&self, end: Seqno, visible_end: Seqno) -> Result<()> {
    let mut inner = self.inner.lock();
    let open = &mut inner.open;
    if open.checkpoint_type() != CheckpointType::Memory {
      return Err(Error::ExtendNotMemory {
        vbid: self.vbid,
        id: open.id(),
      });
    }
    if end < open.snapshot_range().start {
      return Err(Error::BadSnapshot {
        vbid: self.vbid,
        start: open.snapshot_range().start,
        end,
      });
    }
    let visible_end = visible_end.max(open.visible_snapshot_end());
    open.set_snapshot_end(end);
    open.set_visible_end(visible_end);
    Ok(())
  }

  /// Close the open checkpoint if it holds items / 打开的检查点有条目时关闭它
  pub fn create_new_checkpoint(&self, force: bool) -> CheckpointId {
    let mut inner = self.inner.lock();
    if !force && inner.open.num_items() == 0 {
      return inner.open.id();
    }
    let spec = if inner.vb_state == VBucketState::Active {
      inner.active_spec()
    } else {
      inner.inherited_spec()
    };
    inner.add_checkpoint(spec, &self.mem_cb)
  }

  /// Resume point for a reconnecting stream / 重连流的恢复点
  pub fn get_snapshot_info(&self) -> SnapshotInfo {
    let inner = self.inner.lock();
    let last = inner.last_by_seqno;
    let range = inner.open.snapshot_range();
    if inner.open.num_items() == 0 && last < range.start {
      return SnapshotInfo {
        start: last,
        range: SnapshotRange::new(last, last),
      };
    }
    SnapshotInfo { start: last, range }
  }

  /// Drop every checkpoint and reposition all cursors
  /// 丢弃全部检查点并重新定位所有游标
  pub fn clear(&self, last_seqno: Seqno) {
    let dropped = {
      let mut inner = self.inner.lock();
      let next = last_seqno + 1;
      let open = Checkpoint::new(
        inner.open.id() + 1,
        SnapshotRange::new(next, next),
        last_seqno,
        None,
        CheckpointType::Memory,
        false,
        next,
        Some(Arc::clone(&self.mem_cb)),
      );
      let prev = std::mem::replace(&mut inner.open, open);
      let mut dropped: Vec<Checkpoint> = inner.closed.drain(..).collect();
      dropped.push(prev);

      inner.last_by_seqno = last_seqno;
      inner.max_visible_seqno = last_seqno;
      let id = inner.open.id();
      let (pos, seqno) = inner.open.start_position();
      let n = inner.cursors.len();
      for cursor in inner.cursors.values_mut() {
        cursor.ckpt_id = id;
        cursor.move_to(pos, seqno);
      }
      inner.open.num_cursors = n;
      dropped
    };
    debug!("{} cleared {} checkpoints", self.vbid, dropped.len());
  }

  #[inline]
  pub fn high_seqno(&self) -> Seqno {
    self.inner.lock().last_by_seqno
  }

  #[inline]
  pub fn max_visible_seqno(&self) -> Seqno {
    self.inner.lock().max_visible_seqno
  }

  #[inline]
  pub fn open_checkpoint_id(&self) -> CheckpointId {
    self.inner.lock().open.id()
  }

  #[inline]
  pub fn open_checkpoint_type(&self) -> CheckpointType {
    self.inner.lock().open.checkpoint_type()
  }

  #[inline]
  pub fn num_checkpoints(&self) -> usize {
    self.inner.lock().len()
  }

  /// Non-meta items across all checkpoints / 所有检查点中的非元条目数
  pub fn num_items(&self) -> usize {
    self.inner.lock().iter().map(Checkpoint::num_items).sum()
  }

  /// Aggregate queue and index overhead / 队列与索引的总开销
  #[inline]
  pub fn mem_overhead(&self) -> usize {
    self.mem_overhead.load(Ordering::Relaxed).max(0) as usize
  }

  /// Run `f` against one checkpoint by id / 按 id 对某个检查点执行 `f`
  pub fn with_checkpoint<R>(&self, id: CheckpointId, f: impl FnOnce(&Checkpoint) -> R) -> Option<R> {
    self.inner.lock().get(id).map(f)
  }

  /// Run `f` against the open checkpoint / 对打开的检查点执行 `f`
  pub fn with_open_checkpoint<R>(&self, f: impl FnOnce(&Checkpoint) -> R) -> R {
    f(&self.inner.lock().open)
  }

  fn notify_flusher(&self) {
    if let Some(f) = &self.flusher {
      f.notify_flush(self.vbid);
    }
  }
}

impl std::fmt::Debug for CheckpointManager {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let inner = self.inner.lock();
    f.debug_struct("CheckpointManager")
      .field("vbid", &self.vbid)
      .field("checkpoints", &inner.iter().collect::<Vec<_>>())
      .field("last_by_seqno", &inner.last_by_seqno)
      .finish()
  }
}
