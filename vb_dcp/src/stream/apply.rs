//! Message application, snapshot markers and snapshot ends
//! 消息应用、快照标记与快照结束

use log::{debug, error, warn};
use vb_base::{Seqno, Status, VBucketState};
use vb_ckp::{CheckpointType, SnapshotRange};

use super::{PassiveStream, SnapshotType, StreamState};
use crate::{DcpResponse, Error, ReadyMessage, Result, SnapshotMarker};

impl PassiveStream {
  /// Dispatch one message to the vBucket / 将一条消息分发给 vBucket
  pub(crate) fn process_message(&self, msg: &DcpResponse) -> Result<Status> {
    let vb = &self.vb;
    match msg {
      DcpResponse::Mutation(it) => self.apply(msg, it.by_seqno, false, || vb.set_with_meta(it)),
      DcpResponse::Deletion(it) | DcpResponse::Expiration(it) => {
        self.apply(msg, it.by_seqno, false, || vb.delete_with_meta(it))
      }
      DcpResponse::Prepare(it) => self.apply(msg, it.by_seqno, true, || vb.prepare(it)),
      DcpResponse::Commit {
        key,
        prepare_seqno,
        commit_seqno,
      } => self.apply(msg, *commit_seqno, false, || {
        vb.commit(key, *prepare_seqno, *commit_seqno)
      }),
      DcpResponse::Abort {
        key,
        prepare_seqno,
        abort_seqno,
      } => self.apply(msg, *abort_seqno, false, || {
        vb.abort(key, *prepare_seqno, *abort_seqno)
      }),
      DcpResponse::SystemEvent(it) => {
        self.apply(msg, it.by_seqno, false, || vb.system_event(it))
      }
      DcpResponse::SeqnoAdvanced(seqno) => self.apply(msg, *seqno, false, || Status::Success),
      DcpResponse::SnapshotMarker(m) => self.process_marker(m),
      DcpResponse::SetVBucketState(state) => Ok(self.process_set_vbucket_state(*state)),
      DcpResponse::StreamEnd(reason) => {
        self.set_dead(*reason);
        Ok(Status::Success)
      }
    }
  }

  /// Apply a seqno-carrying message inside the current snapshot
  /// 在当前快照内应用一条带序列号的消息
  fn apply(
    &self,
    msg: &DcpResponse,
    seqno: Seqno,
    prepare: bool,
    f: impl FnOnce() -> Status,
  ) -> Result<Status> {
    {
      let s = self.state.lock();
      if seqno <= s.last_seqno.get() || seqno < s.snap.start || seqno > s.snap.end {
        warn!(
          "{} {} seqno {seqno} outside snapshot {} (last {})",
          self.vbid(),
          msg.name(),
          s.snap,
          s.last_seqno.get()
        );
        return Ok(Status::OutOfRange);
      }
    }

    let status = f();
    if !status.is_success() {
      return Ok(status);
    }

    {
      let mut s = self.state.lock();
      s.last_seqno.set(seqno)?;
      if prepare {
        s.snap_prepare = true;
      }
    }
    self.handle_snapshot_end(seqno)?;
    Ok(Status::Success)
  }

  /// Open or extend a checkpoint for a snapshot marker
  /// 为快照标记打开或扩展检查点
  ///
  /// Extends only a Memory snapshot following a Memory snapshot without the
  /// CHK flag. A history Disk marker ending where the previous snapshot ended
  /// keeps the recorded snapshot.
  /// 仅当内存快照紧跟内存快照且无 CHK 标志时扩展。
  /// 终点与上一快照相同的 history 磁盘标记保留已记录的快照。
  pub fn process_marker(&self, m: &SnapshotMarker) -> Result<Status> {
    let vbid = self.vbid();
    let cm = self.vb.checkpoint_manager();
    let disk = m.is_disk();
    if m.start > m.end {
      warn!("{vbid} marker {}-{} ends before it starts", m.start, m.end);
      return Ok(Status::OutOfRange);
    }

    let hcs = if disk && !self.conf.sync_replication {
      Some(0)
    } else if disk {
      match m.hcs {
        Some(h) => Some(h),
        None => {
          warn!("{vbid} disk marker {}-{} without hcs", m.start, m.end);
          return Ok(Status::OutOfRange);
        }
      }
    } else {
      m.hcs
    };

    let visible_end = m.mvs.unwrap_or(m.end);
    if visible_end > m.end {
      let err = Error::VisibleBeyondEnd {
        vbid,
        mvs: visible_end,
        end: m.end,
      };
      error!("{err}");
      return Err(err);
    }

    let ckpt_type = match (disk, self.vb.high_seqno()) {
      (true, 0) => CheckpointType::InitialDisk,
      (true, _) => CheckpointType::Disk,
      (false, _) => CheckpointType::Memory,
    };

    let open_memory = cm.open_checkpoint_type() == CheckpointType::Memory;
    let extend = {
      let mut s = self.state.lock();
      let extend =
        !disk && !m.is_checkpoint() && s.snap_type == SnapshotType::Memory && open_memory;
      if extend && m.end < s.snap.end {
        warn!(
          "{vbid} marker {}-{} would shrink snapshot {}",
          m.start, m.end, s.snap
        );
        return Ok(Status::OutOfRange);
      }
      let keep = m.is_history() && disk && m.end == s.snap.end;
      if !keep {
        s.snap = SnapshotRange::new(m.start, m.end);
        s.snap_type = if disk {
          SnapshotType::Disk
        } else {
          SnapshotType::Memory
        };
      }
      s.snap_prepare = false;
      extend
    };

    if ckpt_type == CheckpointType::InitialDisk {
      self.vb.set_receiving_initial_disk_snapshot(true);
    }

    if extend {
      cm.extend_open_checkpoint(m.end, visible_end)?;
      debug!("{vbid} extend open checkpoint to {}", m.end);
    } else {
      let id = cm.create_snapshot(m.start, m.end, hcs, ckpt_type, visible_end, m.is_history())?;
      debug!("{vbid} {ckpt_type} snapshot {}-{} in checkpoint {id}", m.start, m.end);
    }

    if m.needs_ack() {
      self.push_ready(ReadyMessage::SnapshotMarkerResponse {
        opaque: self.opaque,
        status: Status::Success,
      });
    }
    Ok(Status::Success)
  }

  /// Bookkeeping once the last seqno of the snapshot is applied
  /// 应用快照最后一个序列号后的处理
  ///
  /// The replica monitor only hears about snapshots that carried a prepare,
  /// or Disk snapshots which may have had prepares de-duplicated away.
  /// 仅当快照含预备写，或为可能去重掉预备写的磁盘快照时，才通知副本监视器。
  pub fn handle_snapshot_end(&self, seqno: Seqno) -> Result<()> {
    let notify = {
      let mut s = self.state.lock();
      if seqno != s.snap.end {
        return Ok(());
      }
      let disk = s.snap_type == SnapshotType::Disk;
      if disk && self.vb.is_receiving_initial_disk_snapshot() {
        self.vb.set_receiving_initial_disk_snapshot(false);
      }
      let notify = (s.snap_prepare || disk).then_some(disk);
      s.snap_prepare = false;
      notify
    };
    if let Some(disk) = notify {
      self.vb.notify_snapshot_end(seqno, disk)?;
    }
    Ok(())
  }

  fn process_set_vbucket_state(&self, state: VBucketState) -> Status {
    let status = self.vb.set_state(state);
    debug!("{} set state {state}: {status}", self.vbid());
    if !status.is_retryable() {
      self.push_ready(ReadyMessage::SetVBucketStateResponse {
        opaque: self.opaque,
        status,
      });
    }
    status
  }

  #[inline]
  pub fn is_dead(&self) -> bool {
    self.state.lock().status == StreamState::Dead
  }
}
