//! One vBucket: documents, checkpoints and the durability monitor of its role
//! 单个 vBucket：文档、检查点及其角色对应的持久性监视器

mod durable;
mod flush;
mod replica;
mod stat;

use std::sync::{
  Arc,
  atomic::{AtomicBool, AtomicU64, Ordering},
};

use bytes::Bytes;
pub use flush::Flushed;
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use vb_base::{
  Cookie, DocKey, Hlc, Item, Requirements, Seqno, Status, VBucketState, Vbid, doc_key,
};
use vb_ckp::{CheckpointManager, FlusherNotify, GenerateBySeqno, SnapshotRange};
use vb_dcp::{PassiveStream, ReplicationThrottle};
use vb_durability::{
  ActiveDurabilityMonitor, Error as DurabilityError, PassiveDurabilityMonitor, SeqnoAckSink,
};

use crate::{ClientNotifier, HashTable, Result, StoredValue, VBucketConf};

/// Monitor matching the vBucket state; cloned out of the lock before use
/// 与 vBucket 状态匹配的监视器；使用前从锁中克隆出来
#[derive(Clone)]
enum Dm {
  Active(Arc<ActiveDurabilityMonitor>),
  Passive(Arc<PassiveDurabilityMonitor>),
}

pub struct VBucket {
  vbid: Vbid,
  conf: VBucketConf,
  state: RwLock<VBucketState>,
  hlc: Hlc,
  ht: HashTable,
  cm: CheckpointManager,
  dm: RwLock<Dm>,
  notifier: Option<Arc<dyn ClientNotifier>>,
  /// Kept so a new passive monitor can be wired on demotion
  /// 保留以便降级时接入新的被动监视器
  ack_sink: Mutex<Option<Arc<dyn SeqnoAckSink>>>,
  /// Held from queueing a prepare until it is tracked, so the monitor sees
  /// prepares from every stripe in seqno order
  /// 从预备写入队到被跟踪期间持有，使监视器按序列号顺序看到各分片的预备写
  prepare_order: Mutex<()>,
  initial_disk: AtomicBool,
  persisted: AtomicU64,
}

impl VBucket {
  pub fn new(
    vbid: Vbid,
    state: VBucketState,
    conf: VBucketConf,
    flusher: Option<Arc<dyn FlusherNotify>>,
    notifier: Option<Arc<dyn ClientNotifier>>,
  ) -> Self {
    let cm = CheckpointManager::new(
      vbid,
      state,
      0,
      SnapshotRange::default(),
      0,
      &conf.ckp(),
      flusher,
    );
    let dm = if state == VBucketState::Active {
      Dm::Active(Arc::new(ActiveDurabilityMonitor::new(
        vbid,
        &conf.durability(),
      )))
    } else {
      Dm::Passive(Arc::new(PassiveDurabilityMonitor::new(vbid, 0, 0)))
    };
    info!("{vbid} created as {state}");
    Self {
      vbid,
      ht: HashTable::new(conf.hash_stripes),
      conf,
      state: RwLock::new(state),
      hlc: Hlc::new(),
      cm,
      dm: RwLock::new(dm),
      notifier,
      ack_sink: Mutex::new(None),
      prepare_order: Mutex::new(()),
      initial_disk: AtomicBool::new(false),
      persisted: AtomicU64::new(0),
    }
  }

  #[inline]
  pub fn vbid(&self) -> Vbid {
    self.vbid
  }

  #[inline]
  pub fn state(&self) -> VBucketState {
    *self.state.read()
  }

  #[inline]
  pub fn conf(&self) -> &VBucketConf {
    &self.conf
  }

  #[inline]
  pub fn checkpoint_manager(&self) -> &CheckpointManager {
    &self.cm
  }

  #[inline]
  pub fn hlc(&self) -> &Hlc {
    &self.hlc
  }

  #[inline]
  pub fn high_seqno(&self) -> Seqno {
    self.cm.high_seqno()
  }

  /// Highest seqno the flusher has written / 刷盘器已写入的最高序列号
  #[inline]
  pub fn persisted_seqno(&self) -> Seqno {
    self.persisted.load(Ordering::Acquire)
  }

  #[inline]
  fn dm(&self) -> Dm {
    self.dm.read().clone()
  }

  fn notify(&self, cookie: Cookie, status: Status) {
    if let Some(n) = &self.notifier {
      n.notify_io_complete(cookie, status);
    }
  }

  /// Committed value of a live document / 存活文档的已提交值
  pub fn get(&self, key: impl AsRef<[u8]>) -> Option<StoredValue> {
    let key = doc_key(key);
    self
      .ht
      .lock(&key)
      .committed
      .get(&key)
      .filter(|v| !v.deleted)
      .cloned()
  }

  /// In-flight prepare of `key` / `key` 的进行中预备写
  pub fn get_prepared(&self, key: impl AsRef<[u8]>) -> Option<StoredValue> {
    let key = doc_key(key);
    self.ht.lock(&key).prepared.get(&key).cloned()
  }

  /// Store a document. Durable writes return `WouldBlock` and complete
  /// through the notifier.
  /// 存储文档。持久写返回 `WouldBlock`，经通知器完成。
  pub fn set(
    &self,
    key: impl AsRef<[u8]>,
    value: impl Into<Bytes>,
    reqs: Option<Requirements>,
    cookie: Option<Cookie>,
  ) -> Result<Status> {
    let item = match reqs.filter(Requirements::is_durable) {
      Some(reqs) => Item::pending(key, value, reqs),
      None => Item::mutation(key, value),
    };
    self.write(item, cookie)
  }

  pub fn delete(
    &self,
    key: impl AsRef<[u8]>,
    reqs: Option<Requirements>,
    cookie: Option<Cookie>,
  ) -> Result<Status> {
    let item = match reqs.filter(Requirements::is_durable) {
      Some(reqs) => Item::pending(key, Bytes::new(), reqs).with_deleted(true),
      None => Item::deletion(key),
    };
    self.write(item, cookie)
  }

  fn write(&self, item: Item, cookie: Option<Cookie>) -> Result<Status> {
    if self.state() != VBucketState::Active {
      return Ok(Status::NotMyVbucket);
    }
    let adm = match (item.durability.is_some(), self.dm()) {
      (false, _) => None,
      (true, Dm::Active(adm)) if adm.is_durability_possible() => Some(adm),
      (true, _) => return Ok(Status::DurabilityImpossible),
    };

    let key: DocKey = item.key.clone();
    {
      let mut stripe = self.ht.lock(&key);
      if stripe.prepared.contains_key(&key) {
        return Ok(Status::SyncWriteInProgress);
      }
      if item.deleted && !stripe.is_live(&key) {
        return Ok(Status::KeyNotFound);
      }
      let item = item.with_rev_seqno(stripe.next_rev(&key));
      let _order = adm.as_ref().map(|_| self.prepare_order.lock());
      let q = self
        .cm
        .queue_dirty(item, GenerateBySeqno::Yes, Some(&self.hlc))?;
      let sv = StoredValue::of(&q.item);
      match &adm {
        Some(adm) => {
          let seqno = q.item.by_seqno;
          if let Err(e) = adm.add_sync_write(cookie, q.item) {
            // Topology changed since the check; the queued prepare must not linger
            warn!("{} prepare {seqno} untracked: {e}", self.vbid);
            self
              .cm
              .queue_dirty(Item::abort(key, seqno), GenerateBySeqno::Yes, Some(&self.hlc))?;
            return match e {
              DurabilityError::NoTopology(_) | DurabilityError::DurabilityImpossible { .. } => {
                Ok(Status::DurabilityImpossible)
              }
              e => Err(e.into()),
            };
          }
          stripe.prepared.insert(key, sv);
        }
        None => {
          stripe.committed.insert(key, sv);
        }
      }
    }

    if adm.is_some() {
      self.process_resolved_sync_writes()?;
      return Ok(Status::WouldBlock);
    }
    Ok(Status::Success)
  }

  /// Change role, handing in-flight prepares to the new monitor
  /// 切换角色，将进行中预备写交给新监视器
  ///
  /// Clients blocked on a demoted active learn the outcome is ambiguous.
  /// 降级活跃端上阻塞的客户端得到结果不确定。
  pub fn set_vbucket_state(&self, new: VBucketState) -> Result<()> {
    let mut ambiguous = Vec::new();
    {
      let mut state = self.state.write();
      let old = *state;
      if old == new {
        return Ok(());
      }
      let mut dm = self.dm.write();
      let next = match &*dm {
        Dm::Active(adm) if new != VBucketState::Active => {
          ambiguous = adm.get_cookies_for_in_flight_sync_writes();
          let pdm = PassiveDurabilityMonitor::from_outstanding(self.vbid, adm.outstanding());
          if let Some(sink) = self.ack_sink.lock().clone() {
            pdm.set_ack_sink(Some(sink));
          }
          Some(Dm::Passive(Arc::new(pdm)))
        }
        Dm::Passive(pdm) if new == VBucketState::Active => {
          let adm = ActiveDurabilityMonitor::from_outstanding(
            self.vbid,
            &self.conf.durability(),
            pdm.outstanding(),
            self.persisted_seqno(),
          )?;
          Some(Dm::Active(Arc::new(adm)))
        }
        _ => None,
      };
      if let Some(next) = next {
        *dm = next;
      }
      drop(dm);

      self.cm.queue_set_vbucket_state(new)?;
      *state = new;
      info!("{} state {old} -> {new}", self.vbid);
    }

    if !ambiguous.is_empty() {
      warn!(
        "{} {} sync writes ambiguous on demotion",
        self.vbid,
        ambiguous.len()
      );
    }
    for cookie in ambiguous {
      self.notify(cookie, Status::SyncWriteAmbiguous);
    }
    Ok(())
  }

  /// Replica stream feeding this vBucket / 向此 vBucket 供数据的副本流
  pub fn passive_stream(
    self: &Arc<Self>,
    throttle: Arc<dyn ReplicationThrottle>,
    opaque: u32,
  ) -> Arc<PassiveStream> {
    PassiveStream::new(
      Arc::clone(self) as Arc<dyn vb_dcp::ReplicaVBucket>,
      throttle,
      opaque,
      &self.conf.dcp(),
    )
  }
}
