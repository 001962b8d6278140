//! Persistence of queued items
//! 排队条目的持久化

use std::sync::atomic::Ordering;

use log::debug;
use vb_base::{QueuedItem, Seqno};

use super::{Dm, VBucket};
use crate::{Result, Store};

/// Outcome of one flush / 单次刷盘结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flushed {
  pub items: usize,
  /// Highest seqno written, if any / 写入的最高序列号
  pub high_seqno: Option<Seqno>,
  /// Closed checkpoints released afterwards / 随后释放的已关闭检查点数
  pub removed: usize,
  pub more: bool,
}

impl VBucket {
  /// Write the next batch of the persistence cursor to `store`
  /// 将持久化游标的下一批条目写入 `store`
  pub fn flush(&self, store: &dyn Store) -> Result<Flushed> {
    let batch = self.cm.get_items_for_persistence(self.conf.flush_batch)?;
    let items: Vec<QueuedItem> = batch
      .items
      .into_iter()
      .filter(|qi| !qi.is_meta())
      .collect();
    let high_seqno = items.iter().map(|qi| qi.by_seqno).max();
    if !items.is_empty() {
      store.write(self.vbid, &items);
    }

    if let Some(seqno) = high_seqno {
      self.persisted.fetch_max(seqno, Ordering::AcqRel);
      match self.dm() {
        Dm::Active(adm) => {
          adm.notify_local_persistence(seqno)?;
          self.process_resolved_sync_writes()?;
        }
        Dm::Passive(pdm) => pdm.notify_local_persistence(seqno)?,
      }
    }

    let removed = self
      .cm
      .remove_closed_unref_checkpoints(self.cm.conf().remove_batch)
      .count;
    let r = Flushed {
      items: items.len(),
      high_seqno,
      removed,
      more: batch.more_available,
    };
    debug!("{} flushed {r:?}", self.vbid);
    Ok(r)
  }
}
