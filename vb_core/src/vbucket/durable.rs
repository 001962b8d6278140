//! Synchronous replication on the active side
//! 活跃端的同步复制

use coarsetime::Instant;
use log::{debug, error, warn};
use vb_base::{Cookie, DocKey, Item, Seqno, Status};
use vb_ckp::GenerateBySeqno;
use vb_durability::{Resolution, SyncWriteResolver};

use super::{Dm, VBucket};
use crate::{Result, StoredValue};

impl VBucket {
  /// Apply writes the active monitor has resolved, in seqno order
  /// 按序列号顺序应用活跃监视器已裁决的写
  pub fn process_resolved_sync_writes(&self) -> Result<usize> {
    let Dm::Active(adm) = self.dm() else {
      return Ok(0);
    };
    Ok(adm.process_completed_sync_write_queue(self)?)
  }

  pub fn seqno_acknowledged(&self, node: &str, prepared_seqno: Seqno) -> Result<()> {
    let Dm::Active(adm) = self.dm() else {
      warn!("{} seqno ack from {node} while not active", self.vbid);
      return Ok(());
    };
    adm.seqno_ack_received(node, prepared_seqno)?;
    self.process_resolved_sync_writes()?;
    Ok(())
  }

  /// Install a replication topology, e.g. `[["active","replica"]]`
  /// 安装复制拓扑，例如 `[["active","replica"]]`
  pub fn set_replication_topology(&self, json: &str) -> Result<()> {
    let Dm::Active(adm) = self.dm() else {
      warn!("{} topology ignored while not active", self.vbid);
      return Ok(());
    };
    adm.set_replication_topology(json)?;
    self.process_resolved_sync_writes()?;
    Ok(())
  }

  /// Abort sync writes whose deadline passed before `now`
  /// 中止截止时间早于 `now` 的同步写
  pub fn process_durability_timeout(&self, now: Instant) -> Result<()> {
    let Dm::Active(adm) = self.dm() else {
      return Ok(());
    };
    adm.process_timeout(now)?;
    self.process_resolved_sync_writes()?;
    Ok(())
  }

  pub fn high_prepared_seqno(&self) -> Seqno {
    match self.dm() {
      Dm::Active(adm) => adm.high_prepared_seqno(),
      Dm::Passive(pdm) => pdm.high_prepared_seqno(),
    }
  }

  pub fn high_completed_seqno(&self) -> Seqno {
    match self.dm() {
      Dm::Active(adm) => adm.high_completed_seqno(),
      Dm::Passive(pdm) => pdm.high_completed_seqno(),
    }
  }

  /// Prepares tracked by the current monitor / 当前监视器跟踪的预备写
  pub fn num_tracked_sync_writes(&self) -> usize {
    match self.dm() {
      Dm::Active(adm) => adm.num_tracked(),
      Dm::Passive(pdm) => pdm.num_tracked(),
    }
  }

  /// Replace the prepare with its commit or abort in the table and queue it
  /// 在表中以提交或中止替换预备写并将其入队
  fn complete(&self, key: &DocKey, prepare_seqno: Seqno, resolution: Resolution) -> Status {
    let mut stripe = self.ht.lock(key);
    let current = stripe
      .prepared
      .get(key)
      .is_some_and(|p| p.by_seqno == prepare_seqno);
    let prepared = if current {
      stripe.prepared.remove(key)
    } else {
      None
    };
    let Some(prepared) = prepared else {
      warn!("{} no prepare {prepare_seqno} to complete", self.vbid);
      return Status::KeyNotFound;
    };

    let item = match resolution {
      Resolution::Commit => Item::commit(key.clone(), prepared.value, prepare_seqno)
        .with_deleted(prepared.deleted)
        .with_rev_seqno(prepared.rev_seqno),
      Resolution::Abort => Item::abort(key.clone(), prepare_seqno),
    };
    match self
      .cm
      .queue_dirty(item, GenerateBySeqno::Yes, Some(&self.hlc))
    {
      Ok(q) => {
        debug!(
          "{} {resolution:?} prepare {prepare_seqno} at {}",
          self.vbid, q.item.by_seqno
        );
        if resolution == Resolution::Commit {
          stripe.committed.insert(key.clone(), StoredValue::of(&q.item));
        }
        Status::Success
      }
      Err(e) => {
        error!("{} queue {resolution:?} of {prepare_seqno}: {e}", self.vbid);
        Status::TempFail
      }
    }
  }

  fn notify_opt(&self, cookie: Option<Cookie>, status: Status) {
    if let Some(cookie) = cookie {
      self.notify(cookie, status);
    }
  }
}

impl SyncWriteResolver for VBucket {
  fn commit(&self, key: &DocKey, prepare_seqno: Seqno, cookie: Option<Cookie>) -> Status {
    let status = self.complete(key, prepare_seqno, Resolution::Commit);
    self.notify_opt(cookie, status);
    status
  }

  fn abort(&self, key: &DocKey, prepare_seqno: Seqno, cookie: Option<Cookie>) -> Status {
    let status = self.complete(key, prepare_seqno, Resolution::Abort);
    if status.is_success() {
      self.notify_opt(cookie, Status::SyncWriteAmbiguous);
    } else {
      self.notify_opt(cookie, status);
    }
    status
  }
}
