//! Passive durability monitor: replica side, acks instead of tallying
//! 被动持久性监视器：副本端，发送确认而非统计确认

use std::{
  collections::{BTreeMap, VecDeque},
  sync::Arc,
};

use log::{debug, error};
use parking_lot::{Mutex, RwLock};
use vb_base::{DocKey, Level, Monotonic, QueuedItem, Requirements, Seqno, Vbid, WeaklyMonotonic};

use crate::{ActiveDurabilityMonitor, Error, Outstanding, Resolution, Result, SeqnoAckSink};

#[derive(Debug)]
struct Prepare {
  item: QueuedItem,
  level: Level,
  completed: Option<Resolution>,
}

#[derive(Debug, Clone, Copy)]
struct SnapshotEnd {
  seqno: Seqno,
  disk: bool,
}

struct State {
  tracked: BTreeMap<Seqno, Prepare>,
  snapshot_ends: VecDeque<SnapshotEnd>,
  last_tracked: Monotonic,
  hps: WeaklyMonotonic,
  hcs: WeaklyMonotonic,
  persisted: Seqno,
  accepted: u64,
  completed: u64,
}

impl State {
  /// Move HPS through fully received snapshots / 将 HPS 推进过已完整接收的快照
  ///
  /// Memory snapshot: stop at an unpersisted PersistToMajority prepare.
  /// Disk snapshot: wait for the whole snapshot to be persisted.
  /// 内存快照：遇到未持久化的 PersistToMajority 预备写即停止。
  /// 磁盘快照：等待整个快照持久化。
  fn update_hps(&mut self) -> Result<()> {
    let mut hps = self.hps.get();
    while let Some(end) = self.snapshot_ends.front().copied() {
      if end.disk {
        if self.persisted < end.seqno {
          break;
        }
        if let Some((s, _)) = self.tracked.range(..=end.seqno).next_back() {
          hps = hps.max(*s);
        }
      } else if hps < end.seqno {
        let mut fenced = false;
        for (s, p) in self.tracked.range(hps + 1..=end.seqno) {
          if p.level.persist_on_replica() && *s > self.persisted {
            fenced = true;
            break;
          }
          hps = *s;
        }
        if fenced {
          break;
        }
      }
      self.snapshot_ends.pop_front();
    }
    self.hps.set(hps)?;
    self.prune();
    Ok(())
  }

  /// Drop completed prepares already covered by HPS / 丢弃已被 HPS 覆盖的已完成预备写
  fn prune(&mut self) {
    let hps = self.hps.get();
    while let Some(entry) = self.tracked.first_entry() {
      if *entry.key() > hps || entry.get().completed.is_none() {
        break;
      }
      entry.remove();
    }
  }
}

struct AckSink {
  sink: Option<Arc<dyn SeqnoAckSink>>,
  acked: Seqno,
}

pub struct PassiveDurabilityMonitor {
  vbid: Vbid,
  state: RwLock<State>,
  sink: Mutex<AckSink>,
}

impl PassiveDurabilityMonitor {
  pub fn new(vbid: Vbid, hps: Seqno, hcs: Seqno) -> Self {
    Self::from_outstanding(
      vbid,
      Outstanding {
        hps,
        hcs,
        prepares: Vec::new(),
      },
    )
  }

  /// Take over an active's in-flight prepares on demotion
  /// 降级时接管活跃端的进行中预备写
  pub fn from_active(adm: ActiveDurabilityMonitor) -> Self {
    let vbid = adm.vbid();
    Self::from_outstanding(vbid, adm.into_outstanding())
  }

  pub fn from_outstanding(vbid: Vbid, o: Outstanding) -> Self {
    let last = o.prepares.iter().map(|qi| qi.by_seqno).max().unwrap_or(0);
    let tracked = o
      .prepares
      .into_iter()
      .map(|item| {
        let level = item.durability.map(|r| r.level).unwrap_or_default();
        (
          item.by_seqno,
          Prepare {
            item,
            level,
            completed: None,
          },
        )
      })
      .collect();
    Self {
      vbid,
      state: RwLock::new(State {
        tracked,
        snapshot_ends: VecDeque::new(),
        last_tracked: Monotonic::new("last_tracked_seqno", last),
        hps: WeaklyMonotonic::new("high_prepared_seqno", o.hps),
        hcs: WeaklyMonotonic::new("high_completed_seqno", o.hcs),
        persisted: o.hps,
        accepted: 0,
        completed: 0,
      }),
      sink: Mutex::new(AckSink {
        sink: None,
        acked: o.hps,
      }),
    }
  }

  pub fn into_outstanding(self) -> Outstanding {
    let s = self.state.into_inner();
    Outstanding {
      hps: s.hps.get(),
      hcs: s.hcs.get(),
      prepares: s
        .tracked
        .into_values()
        .filter(|p| p.completed.is_none())
        .map(|p| p.item)
        .collect(),
    }
  }

  pub fn outstanding(&self) -> Outstanding {
    let s = self.state.read();
    Outstanding {
      hps: s.hps.get(),
      hcs: s.hcs.get(),
      prepares: s
        .tracked
        .values()
        .filter(|p| p.completed.is_none())
        .map(|p| p.item.clone())
        .collect(),
    }
  }

  #[inline]
  pub fn vbid(&self) -> Vbid {
    self.vbid
  }

  /// Where seqno acks go / 序列号确认的去向
  pub fn set_ack_sink(&self, sink: Option<Arc<dyn SeqnoAckSink>>) {
    self.sink.lock().sink = sink;
    self.send_ack();
  }

  /// Track a replicated prepare / 跟踪一个复制来的预备写
  pub fn add_sync_write(&self, item: QueuedItem) -> Result<()> {
    let seqno = item.by_seqno;
    let level = item
      .durability
      .filter(Requirements::is_durable)
      .map(|r| r.level)
      .ok_or(Error::NotDurable {
        vbid: self.vbid,
        seqno,
      })?;
    let mut s = self.state.write();
    s.last_tracked.set(seqno)?;
    s.tracked.insert(
      seqno,
      Prepare {
        item,
        level,
        completed: None,
      },
    );
    s.accepted += 1;
    Ok(())
  }

  /// Mark a prepare committed or aborted / 标记预备写已提交或已中止
  ///
  /// Without `prepare_seqno` the oldest uncompleted prepare of `key` is used.
  /// 未给出 `prepare_seqno` 时使用 `key` 最旧的未完成预备写。
  pub fn complete_sync_write(
    &self,
    key: &DocKey,
    resolution: Resolution,
    prepare_seqno: Option<Seqno>,
  ) -> Result<()> {
    {
      let mut s = self.state.write();
      let found = match prepare_seqno {
        Some(seqno) => s
          .tracked
          .get(&seqno)
          .filter(|p| p.completed.is_none() && p.item.key == *key)
          .map(|_| seqno),
        None => s
          .tracked
          .iter()
          .find(|(_, p)| p.completed.is_none() && p.item.key == *key)
          .map(|(seqno, _)| *seqno),
      };
      let Some(seqno) = found else {
        let err = Error::UnknownPrepare {
          vbid: self.vbid,
          key: String::from_utf8_lossy(key).into_owned(),
          seqno: prepare_seqno,
        };
        error!("{err}");
        return Err(err);
      };
      if let Some(p) = s.tracked.get_mut(&seqno) {
        p.completed = Some(resolution);
      }
      s.hcs.advance(seqno);
      s.completed += 1;
      s.prune();
    }
    debug!("{} prepare {:?} {resolution:?}", self.vbid, prepare_seqno);
    Ok(())
  }

  /// The stream applied the last item of a snapshot / 流已应用快照的最后一个条目
  pub fn notify_snapshot_end_received(&self, seqno: Seqno, disk: bool) -> Result<()> {
    {
      let mut s = self.state.write();
      s.snapshot_ends.push_back(SnapshotEnd { seqno, disk });
      s.update_hps()?;
    }
    self.send_ack();
    Ok(())
  }

  pub fn notify_local_persistence(&self, persisted_seqno: Seqno) -> Result<()> {
    {
      let mut s = self.state.write();
      s.persisted = s.persisted.max(persisted_seqno);
      s.update_hps()?;
    }
    self.send_ack();
    Ok(())
  }

  /// Acks are sent under the sink lock so they leave in increasing order
  /// 在 sink 锁下发送确认，保证按递增顺序发出
  fn send_ack(&self) {
    let mut sink = self.sink.lock();
    let hps = self.state.read().hps.get();
    if hps <= sink.acked {
      return;
    }
    let Some(s) = sink.sink.clone() else {
      return;
    };
    s.seqno_ack(self.vbid, hps);
    sink.acked = hps;
  }

  #[inline]
  pub fn num_tracked(&self) -> usize {
    self.state.read().tracked.len()
  }

  pub fn tracked_seqnos(&self) -> Vec<Seqno> {
    self.state.read().tracked.keys().copied().collect()
  }

  #[inline]
  pub fn high_prepared_seqno(&self) -> Seqno {
    self.state.read().hps.get()
  }

  #[inline]
  pub fn high_completed_seqno(&self) -> Seqno {
    self.state.read().hcs.get()
  }

  pub fn add_stats(&self, add: &mut dyn FnMut(&str, &str)) {
    let p = format!("vb_{}:", self.vbid.0);
    let s = self.state.read();
    let mut put = |k: &str, v: String| add(&format!("{p}{k}"), &v);
    put("durability_monitor", "passive".to_owned());
    put("num_tracked", s.tracked.len().to_string());
    put("num_accepted", s.accepted.to_string());
    put("num_completed", s.completed.to_string());
    put("high_prepared_seqno", s.hps.get().to_string());
    put("high_completed_seqno", s.hcs.get().to_string());
    put("last_tracked_seqno", s.last_tracked.get().to_string());
    put("num_pending_snapshot_ends", s.snapshot_ends.len().to_string());
  }
}
