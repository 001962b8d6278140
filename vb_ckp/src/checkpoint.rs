//! Checkpoint: ordered, de-duplicated run of queued items
//! 检查点：有序且去重的排队条目序列
//!
//! Layout of every checkpoint / 每个检查点的布局:
//!
//! ```text
//! [Empty] [CheckpointStart] item item ... [CheckpointEnd]?
//!  pos 0   pos 1
//! ```
//!
//! Items are keyed by an insertion counter so positions stay valid across
//! de-duplication and expel. Only open Memory checkpoints keep a key index.
//! 条目以插入计数为键，去重与驱逐后位置依然有效。仅打开的内存检查点维护键索引。

use std::{
  collections::{BTreeMap, HashMap},
  mem::size_of,
  sync::Arc,
};

use log::trace;
use vb_base::{CheckpointId, DocKey, Item, QueueOp, QueuedItem, Seqno};

use crate::{
  Error, Result,
  cursor::CursorMap,
  snapshot::{CheckpointState, CheckpointType, SnapshotRange},
};

/// Stable position of an item inside one checkpoint / 条目在检查点内的稳定位置
pub type Pos = u64;

/// Receives signed memory-overhead deltas / 接收带符号的内存开销增量
pub type MemCallback = Arc<dyn Fn(isize) + Send + Sync>;

const ENTRY_OVERHEAD: usize = size_of::<Pos>() + size_of::<QueuedItem>() + 2 * size_of::<usize>();
const INDEX_OVERHEAD: usize = size_of::<DocKey>() + size_of::<IndexEntry>() + size_of::<usize>();

const DUMMY_POS: Pos = 0;
const START_POS: Pos = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum IndexPos {
  Live(Pos),
  /// Item removed by expel, kept to detect duplicates
  /// 已被驱逐的条目，保留以检测重复
  Expelled { sync_write: bool },
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct IndexEntry {
  pos: IndexPos,
  seqno: Seqno,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDirtyStatus {
  /// New key for this checkpoint / 本检查点的新键
  NewItem,
  /// Replaced an item not yet persisted / 替换了尚未持久化的条目
  ExistingItem,
  /// Replaced an item the flusher already passed / 替换了刷盘器已越过的条目
  PersistAgain,
  /// Sync write cannot be de-duplicated here / 同步写不能在此去重
  FailureDuplicateItem,
}

impl QueueDirtyStatus {
  #[inline]
  pub const fn is_success(self) -> bool {
    !matches!(self, Self::FailureDuplicateItem)
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDirtyResult {
  pub status: QueueDirtyStatus,
  /// Change of the queued byte count / 排队字节数的变化
  pub size_delta: isize,
}

pub struct Checkpoint {
  id: CheckpointId,
  state: CheckpointState,
  snap: SnapshotRange,
  visible_end: Seqno,
  hcs: Option<Seqno>,
  ckpt_type: CheckpointType,
  history: bool,
  items: BTreeMap<Pos, QueuedItem>,
  next_pos: Pos,
  start_seqno: Seqno,
  committed: HashMap<DocKey, IndexEntry>,
  prepared: HashMap<DocKey, IndexEntry>,
  index_key_bytes: usize,
  num_items: usize,
  num_meta: usize,
  queued_bytes: usize,
  expelled: usize,
  high_seqno: Seqno,
  pub(crate) num_cursors: usize,
  mem_cb: Option<MemCallback>,
  reported: usize,
}

impl Checkpoint {
  /// `meta_seqno` is the seqno of the dummy and start items (last queued + 1)
  /// `meta_seqno` 为哑元与起始条目的序列号（最后入队 + 1）
  #[allow(clippy::too_many_arguments)]
  pub(crate) fn new(
    id: CheckpointId,
    snap: SnapshotRange,
    visible_end: Seqno,
    hcs: Option<Seqno>,
    ckpt_type: CheckpointType,
    history: bool,
    meta_seqno: Seqno,
    mem_cb: Option<MemCallback>,
  ) -> Self {
    let mut c = Self {
      id,
      state: CheckpointState::Open,
      snap,
      visible_end,
      hcs,
      ckpt_type,
      history,
      items: BTreeMap::new(),
      next_pos: DUMMY_POS,
      start_seqno: meta_seqno,
      committed: HashMap::new(),
      prepared: HashMap::new(),
      index_key_bytes: 0,
      num_items: 0,
      num_meta: 0,
      queued_bytes: 0,
      expelled: 0,
      high_seqno: 0,
      num_cursors: 0,
      mem_cb,
      reported: 0,
    };
    c.push(Item::meta(QueueOp::Empty, meta_seqno).into_queued());
    c.push(Item::meta(QueueOp::CheckpointStart, meta_seqno).into_queued());
    c.report_overhead();
    c
  }

  /// Queue an item, de-duplicating by key in open Memory checkpoints
  /// 入队条目，打开的内存检查点按键去重
  pub(crate) fn queue_dirty(
    &mut self,
    qi: QueuedItem,
    cursors: &mut CursorMap,
  ) -> Result<QueueDirtyResult> {
    if self.state != CheckpointState::Open {
      return Err(Error::NotOpen {
        id: self.id,
        op: qi.op,
      });
    }
    let before = self.queued_bytes as isize;

    if qi.is_meta() || !self.indexed() {
      self.push(qi);
      self.report_overhead();
      return Ok(self.result(QueueDirtyStatus::NewItem, before));
    }

    let committed = qi.is_committed();
    let found = self.index(committed).get(&qi.key).copied();
    let status = match found {
      None => {
        let key = qi.key.clone();
        let seqno = qi.by_seqno;
        let pos = self.push(qi);
        self.index_insert(committed, key, pos, seqno);
        QueueDirtyStatus::NewItem
      }
      Some(IndexEntry {
        pos: IndexPos::Expelled { sync_write },
        ..
      }) => {
        if sync_write || qi.op == QueueOp::CommitSyncWrite {
          return Ok(self.result(QueueDirtyStatus::FailureDuplicateItem, before));
        }
        let key = qi.key.clone();
        let seqno = qi.by_seqno;
        let pos = self.push(qi);
        self.index_insert(committed, key, pos, seqno);
        QueueDirtyStatus::PersistAgain
      }
      Some(IndexEntry {
        pos: IndexPos::Live(old_pos),
        seqno: old_seqno,
      }) => {
        let old_sync = self
          .items
          .get(&old_pos)
          .is_some_and(|old| old.op.is_sync_write());
        if old_sync || qi.op.is_sync_write() {
          return Ok(self.result(QueueDirtyStatus::FailureDuplicateItem, before));
        }
        let status = self.rewind_cursors(old_pos, old_seqno, cursors);
        let key = qi.key.clone();
        let seqno = qi.by_seqno;
        let pos = self.push(qi);
        self.erase(old_pos);
        self.index_insert(committed, key, pos, seqno);
        status
      }
    };
    self.report_overhead();
    Ok(self.result(status, before))
  }

  /// Step cursors off the replaced position, decide PersistAgain
  /// 将游标移出被替换的位置，并判定是否需要重新持久化
  fn rewind_cursors(
    &self,
    old_pos: Pos,
    old_seqno: Seqno,
    cursors: &mut CursorMap,
  ) -> QueueDirtyStatus {
    let mut status = QueueDirtyStatus::ExistingItem;
    let prev = self
      .items
      .range(..old_pos)
      .next_back()
      .map(|(p, qi)| (*p, qi.by_seqno));
    for cursor in cursors.values_mut().filter(|c| c.ckpt_id == self.id) {
      if cursor.is_persistence() {
        let mut seqno = cursor.seqno;
        if self.items.get(&cursor.pos).is_some_and(|qi| qi.is_meta()) {
          seqno = seqno.saturating_sub(1);
        }
        if old_seqno <= seqno {
          status = QueueDirtyStatus::PersistAgain;
        }
      }
      if cursor.pos == old_pos
        && let Some((p, s)) = prev
      {
        trace!("ckpt {} cursor {} steps back to {p}", self.id, cursor.name);
        cursor.move_to(p, s);
      }
    }
    status
  }

  /// Remove items in `(CheckpointStart, upto]`, returned for release outside locks
  /// 移除 `(CheckpointStart, upto]` 区间的条目，返回以便在锁外释放
  pub(crate) fn expel_items(&mut self, upto: Pos, cursors: &mut CursorMap) -> Result<Vec<QueuedItem>> {
    let last = self.last_pos();
    if upto >= last {
      return Err(Error::ExpelLast { id: self.id });
    }
    let targets: Vec<Pos> = self
      .items
      .range(START_POS + 1..=upto)
      .map(|(p, _)| *p)
      .collect();
    if targets.is_empty() {
      return Err(Error::NothingToExpel { id: self.id });
    }

    let mut out = Vec::with_capacity(targets.len());
    for pos in targets {
      let Some(qi) = self.erase(pos) else { continue };
      if !qi.is_meta() {
        let sync_write = qi.op.is_sync_write();
        if let Some(e) = self.index_mut(qi.is_committed()).get_mut(&qi.key)
          && e.pos == IndexPos::Live(pos)
        {
          e.pos = IndexPos::Expelled { sync_write };
        }
      }
      self.expelled += 1;
      out.push(qi);
    }

    let start_seqno = self.start_seqno;
    for cursor in cursors.values_mut().filter(|c| c.ckpt_id == self.id) {
      if cursor.pos > START_POS && cursor.pos <= upto {
        cursor.move_to(START_POS, start_seqno);
      }
    }
    self.report_overhead();
    Ok(out)
  }

  /// Lowest seqno a new cursor can be placed at / 新游标可放置的最低序列号
  pub fn minimum_cursor_seqno(&self) -> Seqno {
    if self.expelled == 0 {
      return self.start_seqno;
    }
    self
      .items
      .range(START_POS + 1..)
      .map(|(_, qi)| qi)
      .find(|qi| !matches!(qi.op, QueueOp::Empty | QueueOp::CheckpointStart))
      .map_or(self.start_seqno, |qi| qi.by_seqno)
  }

  /// Close and drop the key index / 关闭并丢弃键索引
  pub(crate) fn close(&mut self, end_seqno: Seqno) {
    self.push(Item::meta(QueueOp::CheckpointEnd, end_seqno).into_queued());
    self.state = CheckpointState::Closed;
    self.clear_index();
    self.report_overhead();
  }

  fn result(&self, status: QueueDirtyStatus, before: isize) -> QueueDirtyResult {
    QueueDirtyResult {
      status,
      size_delta: self.queued_bytes as isize - before,
    }
  }

  fn push(&mut self, qi: QueuedItem) -> Pos {
    let pos = self.next_pos;
    self.next_pos += 1;
    if qi.is_meta() {
      self.num_meta += 1;
    } else {
      self.num_items += 1;
      self.high_seqno = self.high_seqno.max(qi.by_seqno);
    }
    self.queued_bytes += qi.size();
    self.items.insert(pos, qi);
    pos
  }

  fn erase(&mut self, pos: Pos) -> Option<QueuedItem> {
    let qi = self.items.remove(&pos)?;
    if qi.is_meta() {
      self.num_meta -= 1;
    } else {
      self.num_items -= 1;
    }
    self.queued_bytes -= qi.size();
    Some(qi)
  }

  #[inline]
  fn indexed(&self) -> bool {
    self.state == CheckpointState::Open && !self.ckpt_type.is_disk()
  }

  #[inline]
  fn index(&self, committed: bool) -> &HashMap<DocKey, IndexEntry> {
    if committed { &self.committed } else { &self.prepared }
  }

  #[inline]
  fn index_mut(&mut self, committed: bool) -> &mut HashMap<DocKey, IndexEntry> {
    if committed {
      &mut self.committed
    } else {
      &mut self.prepared
    }
  }

  fn index_insert(&mut self, committed: bool, key: DocKey, pos: Pos, seqno: Seqno) {
    let len = key.len();
    let entry = IndexEntry {
      pos: IndexPos::Live(pos),
      seqno,
    };
    if self.index_mut(committed).insert(key, entry).is_none() {
      self.index_key_bytes += len;
    }
  }

  fn clear_index(&mut self) {
    self.committed = HashMap::new();
    self.prepared = HashMap::new();
    self.index_key_bytes = 0;
  }

  /// Current memory overhead of queue and index / 队列与索引的当前内存开销
  pub fn mem_overhead(&self) -> usize {
    self.items.len() * ENTRY_OVERHEAD
      + (self.committed.len() + self.prepared.len()) * INDEX_OVERHEAD
      + self.index_key_bytes
  }

  fn report_overhead(&mut self) {
    let now = self.mem_overhead();
    if now != self.reported {
      if let Some(cb) = &self.mem_cb {
        cb(now as isize - self.reported as isize);
      }
      self.reported = now;
    }
  }

  // Relabeling used by snapshot creation and extension

  pub(crate) fn set_snapshot(&mut self, snap: SnapshotRange, visible_end: Seqno) {
    self.snap = snap;
    self.visible_end = visible_end;
  }

  pub(crate) fn set_snapshot_end(&mut self, end: Seqno) {
    self.snap.end = end;
  }

  pub(crate) fn set_visible_end(&mut self, end: Seqno) {
    self.visible_end = end;
  }

  pub(crate) fn set_type(&mut self, t: CheckpointType) {
    self.ckpt_type = t;
    if t.is_disk() {
      self.clear_index();
      self.report_overhead();
    }
  }

  pub(crate) fn set_hcs(&mut self, hcs: Option<Seqno>) {
    self.hcs = hcs;
  }

  pub(crate) fn set_history(&mut self, history: bool) {
    self.history = history;
  }

  // Queue walking

  /// First item strictly after `pos` / `pos` 之后的第一个条目
  #[inline]
  pub(crate) fn next_after(&self, pos: Pos) -> Option<(Pos, &QueuedItem)> {
    self.items.range(pos + 1..).next().map(|(p, qi)| (*p, qi))
  }

  /// Last position whose item seqno is below `seqno`, never before the start item
  /// 条目序列号小于 `seqno` 的最后位置，不早于起始条目
  pub(crate) fn position_before_seqno(&self, seqno: Seqno) -> (Pos, Seqno) {
    let mut at = (START_POS, self.start_seqno);
    for (p, qi) in self.items.range(START_POS + 1..) {
      if qi.by_seqno >= seqno {
        break;
      }
      at = (*p, qi.by_seqno);
    }
    at
  }

  /// Dummy head, where a cursor entering this checkpoint sits
  /// 哑元头，进入本检查点的游标位于此处
  #[inline]
  pub(crate) fn head_position(&self) -> (Pos, Seqno) {
    (DUMMY_POS, self.start_seqno)
  }

  /// Position preceding `pos`, if any / `pos` 之前的位置
  #[inline]
  pub(crate) fn prev_pos(&self, pos: Pos) -> Option<Pos> {
    self.items.range(..pos).next_back().map(|(p, _)| *p)
  }

  /// Non-meta items after `pos` / `pos` 之后的非元条目数
  pub(crate) fn num_items_after(&self, pos: Pos) -> usize {
    self
      .items
      .range(pos + 1..)
      .filter(|(_, qi)| !qi.is_meta())
      .count()
  }

  #[inline]
  pub(crate) fn start_position(&self) -> (Pos, Seqno) {
    (START_POS, self.start_seqno)
  }

  #[inline]
  pub(crate) fn last_pos(&self) -> Pos {
    self.items.keys().next_back().copied().unwrap_or(DUMMY_POS)
  }

  pub fn iter(&self) -> impl Iterator<Item = &QueuedItem> {
    self.items.values()
  }

  // Accessors

  #[inline]
  pub fn id(&self) -> CheckpointId {
    self.id
  }

  #[inline]
  pub fn state(&self) -> CheckpointState {
    self.state
  }

  #[inline]
  pub fn is_open(&self) -> bool {
    self.state == CheckpointState::Open
  }

  #[inline]
  pub fn snapshot_range(&self) -> SnapshotRange {
    self.snap
  }

  #[inline]
  pub fn visible_snapshot_end(&self) -> Seqno {
    self.visible_end
  }

  #[inline]
  pub fn high_completed_seqno(&self) -> Option<Seqno> {
    self.hcs
  }

  #[inline]
  pub fn checkpoint_type(&self) -> CheckpointType {
    self.ckpt_type
  }

  #[inline]
  pub fn history(&self) -> bool {
    self.history
  }

  /// Non-meta items / 非元条目数
  #[inline]
  pub fn num_items(&self) -> usize {
    self.num_items
  }

  #[inline]
  pub fn num_meta_items(&self) -> usize {
    self.num_meta
  }

  #[inline]
  pub fn queued_bytes(&self) -> usize {
    self.queued_bytes
  }

  #[inline]
  pub fn num_expelled(&self) -> usize {
    self.expelled
  }

  /// Highest non-meta seqno queued, 0 if none / 最高非元序列号，无则为 0
  #[inline]
  pub fn high_seqno(&self) -> Seqno {
    self.high_seqno
  }

  #[inline]
  pub fn start_seqno(&self) -> Seqno {
    self.start_seqno
  }

  #[inline]
  pub fn num_cursors(&self) -> usize {
    self.num_cursors
  }

  /// Keys in the de-dup index / 去重索引中的键数
  #[inline]
  pub fn index_len(&self) -> usize {
    self.committed.len() + self.prepared.len()
  }
}

impl Drop for Checkpoint {
  fn drop(&mut self) {
    if self.reported != 0
      && let Some(cb) = &self.mem_cb
    {
      cb(-(self.reported as isize));
    }
  }
}

impl std::fmt::Debug for Checkpoint {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Checkpoint")
      .field("id", &self.id)
      .field("state", &self.state)
      .field("snap", &self.snap)
      .field("type", &self.ckpt_type)
      .field("num_items", &self.num_items)
      .field("expelled", &self.expelled)
      .field("cursors", &self.num_cursors)
      .finish()
  }
}
