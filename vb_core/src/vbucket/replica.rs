//! Applying replicated messages
//! 应用复制消息

use std::sync::{Arc, atomic::Ordering};

use bytes::Bytes;
use log::{error, warn};
use vb_base::{DocKey, Item, QueueOp, QueuedItem, Seqno, Status, VBucketState, Vbid};
use vb_ckp::{CheckpointManager, GenerateBySeqno};
use vb_dcp::ReplicaVBucket;
use vb_durability::{Resolution, SeqnoAckSink};

use super::{Dm, VBucket};
use crate::StoredValue;

impl VBucket {
  /// Queue a replicated item under the producer's seqno and mirror it in the
  /// table
  /// 以生产者的序列号入队复制条目并同步到表中
  fn apply_replicated(&self, item: Item) -> Result<QueuedItem, Status> {
    if self.state() == VBucketState::Active {
      return Err(Status::NotMyVbucket);
    }
    self.hlc.set_max(item.cas);
    let key = item.key.clone();
    let mut stripe = self.ht.lock(&key);
    let q = self
      .cm
      .queue_dirty(item, GenerateBySeqno::No, None)
      .map_err(|e| {
        error!("{} apply replicated: {e}", self.vbid);
        Status::OutOfRange
      })?;
    let sv = StoredValue::of(&q.item);
    match q.item.op {
      QueueOp::PendingSyncWrite => {
        stripe.prepared.insert(key, sv);
      }
      QueueOp::AbortSyncWrite => {
        stripe.prepared.remove(&key);
      }
      QueueOp::CommitSyncWrite => {
        stripe.prepared.remove(&key);
        stripe.committed.insert(key, sv);
      }
      QueueOp::Mutation => {
        stripe.committed.insert(key, sv);
      }
      _ => {}
    }
    Ok(q.item)
  }

  fn passive_complete(&self, key: &DocKey, resolution: Resolution, prepare_seqno: Seqno) {
    let Dm::Passive(pdm) = self.dm() else {
      return;
    };
    // Prepares deduplicated out of a disk snapshot are never tracked
    if let Err(e) = pdm.complete_sync_write(key, resolution, Some(prepare_seqno)) {
      warn!("{} {resolution:?} {prepare_seqno}: {e}", self.vbid);
    }
  }
}

impl ReplicaVBucket for VBucket {
  fn vbid(&self) -> Vbid {
    self.vbid
  }

  fn high_seqno(&self) -> Seqno {
    self.cm.high_seqno()
  }

  fn checkpoint_manager(&self) -> &CheckpointManager {
    &self.cm
  }

  fn set_with_meta(&self, item: &Item) -> Status {
    self
      .apply_replicated(item.clone())
      .map_or_else(|s| s, |_| Status::Success)
  }

  fn delete_with_meta(&self, item: &Item) -> Status {
    self
      .apply_replicated(item.clone().with_deleted(true))
      .map_or_else(|s| s, |_| Status::Success)
  }

  fn prepare(&self, item: &Item) -> Status {
    let qi = match self.apply_replicated(item.clone()) {
      Ok(qi) => qi,
      Err(s) => return s,
    };
    if let Dm::Passive(pdm) = self.dm()
      && let Err(e) = pdm.add_sync_write(qi)
    {
      error!("{} track prepare {}: {e}", self.vbid, item.by_seqno);
      return Status::InvalidArgs;
    }
    Status::Success
  }

  fn commit(&self, key: &DocKey, prepare_seqno: Seqno, commit_seqno: Seqno) -> Status {
    let (value, deleted) = self
      .ht
      .lock(key)
      .prepared
      .get(key)
      .map_or((Bytes::new(), false), |p| (p.value.clone(), p.deleted));
    let item = Item::commit(key.clone(), value, prepare_seqno)
      .with_deleted(deleted)
      .with_seqno(commit_seqno);
    if let Err(s) = self.apply_replicated(item) {
      return s;
    }
    self.passive_complete(key, Resolution::Commit, prepare_seqno);
    Status::Success
  }

  fn abort(&self, key: &DocKey, prepare_seqno: Seqno, abort_seqno: Seqno) -> Status {
    let item = Item::abort(key.clone(), prepare_seqno).with_seqno(abort_seqno);
    if let Err(s) = self.apply_replicated(item) {
      return s;
    }
    self.passive_complete(key, Resolution::Abort, prepare_seqno);
    Status::Success
  }

  fn system_event(&self, item: &Item) -> Status {
    self
      .apply_replicated(item.clone())
      .map_or_else(|s| s, |_| Status::Success)
  }

  fn set_state(&self, state: VBucketState) -> Status {
    match self.set_vbucket_state(state) {
      Ok(()) => Status::Success,
      Err(e) => {
        error!("{} set state {state}: {e}", self.vbid);
        Status::InvalidArgs
      }
    }
  }

  fn notify_snapshot_end(&self, seqno: Seqno, disk: bool) -> vb_durability::Result<()> {
    match self.dm() {
      Dm::Passive(pdm) => pdm.notify_snapshot_end_received(seqno, disk),
      Dm::Active(_) => Ok(()),
    }
  }

  fn set_seqno_ack_sink(&self, sink: Option<Arc<dyn SeqnoAckSink>>) {
    *self.ack_sink.lock() = sink.clone();
    if let Dm::Passive(pdm) = self.dm() {
      pdm.set_ack_sink(sink);
    }
  }

  fn is_receiving_initial_disk_snapshot(&self) -> bool {
    self.initial_disk.load(Ordering::Acquire)
  }

  fn set_receiving_initial_disk_snapshot(&self, on: bool) {
    self.initial_disk.store(on, Ordering::Release);
  }
}
