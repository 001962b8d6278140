//! Replica vBucket backed by a real checkpoint manager
//! 由真实检查点管理器支撑的副本 vBucket

use std::{
  collections::VecDeque,
  sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
  },
};

use vb_base::{DocKey, Item, Seqno, Status, VBucketState, Vbid};
use vb_ckp::{CheckpointManager, GenerateBySeqno, SnapshotRange};
use vb_dcp::{DcpResponse, MemoryThrottle, ReplicaVBucket, SnapshotMarker, marker_flag};
use vb_durability::SeqnoAckSink;

pub struct MockVb {
  pub cm: CheckpointManager,
  /// Seqnos of applied items / 已应用条目的序列号
  pub applied: Mutex<Vec<Seqno>>,
  /// Statuses returned before applying / 应用前依次返回的状态
  pub fail: Mutex<VecDeque<Status>>,
  pub ends: Mutex<Vec<(Seqno, bool)>>,
  pub initial_disk: AtomicBool,
  pub sink: Mutex<Option<Arc<dyn SeqnoAckSink>>>,
  pub state: Mutex<Option<VBucketState>>,
}

impl MockVb {
  pub fn new() -> Arc<Self> {
    Arc::new(Self {
      cm: CheckpointManager::new(
        Vbid(0),
        VBucketState::Replica,
        0,
        SnapshotRange::default(),
        0,
        &[],
        None,
      ),
      applied: Mutex::default(),
      fail: Mutex::default(),
      ends: Mutex::default(),
      initial_disk: AtomicBool::new(false),
      sink: Mutex::default(),
      state: Mutex::default(),
    })
  }

  fn queue(&self, item: Item) -> Status {
    if let Some(st) = self.fail.lock().unwrap().pop_front() {
      return st;
    }
    let seqno = item.by_seqno;
    match self.cm.queue_dirty(item, GenerateBySeqno::No, None) {
      Ok(_) => {
        self.applied.lock().unwrap().push(seqno);
        Status::Success
      }
      Err(_) => Status::InvalidArgs,
    }
  }
}

impl ReplicaVBucket for MockVb {
  fn vbid(&self) -> Vbid {
    Vbid(0)
  }

  fn high_seqno(&self) -> Seqno {
    self.cm.high_seqno()
  }

  fn checkpoint_manager(&self) -> &CheckpointManager {
    &self.cm
  }

  fn set_with_meta(&self, item: &Item) -> Status {
    self.queue(item.clone())
  }

  fn delete_with_meta(&self, item: &Item) -> Status {
    self.queue(item.clone().with_deleted(true))
  }

  fn prepare(&self, item: &Item) -> Status {
    self.queue(item.clone())
  }

  fn commit(&self, key: &DocKey, prepare_seqno: Seqno, commit_seqno: Seqno) -> Status {
    self.queue(Item::commit(key.clone(), Default::default(), prepare_seqno).with_seqno(commit_seqno))
  }

  fn abort(&self, key: &DocKey, prepare_seqno: Seqno, abort_seqno: Seqno) -> Status {
    self.queue(Item::abort(key.clone(), prepare_seqno).with_seqno(abort_seqno))
  }

  fn system_event(&self, item: &Item) -> Status {
    self.queue(item.clone())
  }

  fn set_state(&self, state: VBucketState) -> Status {
    *self.state.lock().unwrap() = Some(state);
    Status::Success
  }

  fn notify_snapshot_end(&self, seqno: Seqno, disk: bool) -> vb_durability::Result<()> {
    self.ends.lock().unwrap().push((seqno, disk));
    Ok(())
  }

  fn set_seqno_ack_sink(&self, sink: Option<Arc<dyn SeqnoAckSink>>) {
    *self.sink.lock().unwrap() = sink;
  }

  fn is_receiving_initial_disk_snapshot(&self) -> bool {
    self.initial_disk.load(Ordering::Acquire)
  }

  fn set_receiving_initial_disk_snapshot(&self, on: bool) {
    self.initial_disk.store(on, Ordering::Release);
  }
}

/// Memory throttle with a 100 byte quota and 90% threshold
/// 配额 100 字节、阈值 90% 的内存限流
pub fn throttle() -> (Arc<AtomicUsize>, Arc<MemoryThrottle>) {
  let used = Arc::new(AtomicUsize::new(0));
  (used.clone(), Arc::new(MemoryThrottle::new(used, 100, 90)))
}

pub fn mem(start: Seqno, end: Seqno) -> DcpResponse {
  DcpResponse::SnapshotMarker(SnapshotMarker::new(start, end, marker_flag::MEMORY))
}

pub fn mutation(seqno: Seqno) -> DcpResponse {
  DcpResponse::Mutation(Item::mutation(format!("k{seqno}"), "v").with_seqno(seqno))
}
