//! Active durability monitor: tracks sync writes on the vBucket accepting writes
//! 活跃持久性监视器：在接受写入的 vBucket 上跟踪同步写
//!
//! Commits are FIFO: only the oldest tracked write may commit. Timeouts and
//! an impossible topology abort every finite-timeout write they reach,
//! skipping infinite ones, so commits and aborts are each in seqno order.
//! 提交按 FIFO 进行：只有最旧的跟踪写可提交。超时与不可满足的拓扑会中止
//! 所有有限超时的写并跳过无限超时的写，因此提交与中止各自按序列号有序。

mod stat;

use std::collections::{BTreeMap, HashMap};

use coarsetime::Instant;
use log::{debug, error, info, warn};
use parking_lot::RwLock;
use vb_base::{
  Cookie, Monotonic, NodeName, QueuedItem, Requirements, Seqno, Timeout, Vbid, WeaklyMonotonic,
};

use crate::{
  ChainName, Conf, Error, Outstanding, ParsedConf, PassiveDurabilityMonitor, ReplicationChain,
  Resolution, ResolvedQueue, Result, SyncWrite, SyncWriteResolver, topology::parse_topology,
};

struct State {
  vbid: Vbid,
  tracked: BTreeMap<Seqno, SyncWrite>,
  first: Option<ReplicationChain>,
  second: Option<ReplicationChain>,
  topology: Option<String>,
  last_tracked: Monotonic,
  last_committed: Monotonic,
  last_aborted: Monotonic,
  hps: WeaklyMonotonic,
  hcs: WeaklyMonotonic,
  persisted: Seqno,
  /// Acks from nodes not in the topology yet / 来自尚未加入拓扑的节点的确认
  queued_acks: HashMap<NodeName, Seqno>,
  accepted: u64,
  committed: u64,
  aborted: u64,
}

impl State {
  fn new(vbid: Vbid, hps: Seqno, hcs: Seqno) -> Self {
    Self {
      vbid,
      tracked: BTreeMap::new(),
      first: None,
      second: None,
      topology: None,
      last_tracked: Monotonic::new("last_tracked_seqno", 0),
      last_committed: Monotonic::new("last_committed_seqno", 0),
      last_aborted: Monotonic::new("last_aborted_seqno", 0),
      hps: WeaklyMonotonic::new("high_prepared_seqno", hps),
      hcs: WeaklyMonotonic::new("high_completed_seqno", hcs),
      persisted: 0,
      queued_acks: HashMap::new(),
      accepted: 0,
      committed: 0,
      aborted: 0,
    }
  }

  fn is_durability_possible(&self) -> bool {
    self
      .first
      .as_ref()
      .is_some_and(ReplicationChain::is_durability_possible)
      && self
        .second
        .as_ref()
        .is_none_or(ReplicationChain::is_durability_possible)
  }

  fn active_node(&self) -> Option<NodeName> {
    self.first.as_ref().and_then(|c| c.active().cloned())
  }

  fn in_topology(&self, node: &str) -> bool {
    self.first.iter().chain(self.second.iter()).any(|c| c.contains(node))
  }

  /// Move `node` through tracked writes up to `seqno`, acking each
  /// 将 `node` 推进到 `seqno`，并逐个确认跟踪写
  fn advance_node(&mut self, node: &NodeName, seqno: Seqno) {
    let from = self
      .first
      .iter()
      .chain(self.second.iter())
      .filter_map(|c| c.position(node))
      .map(|p| p.seqno)
      .min()
      .unwrap_or(0);
    let mut last_write = None;
    if seqno > from {
      for (s, sw) in self.tracked.range_mut(from + 1..=seqno) {
        sw.ack(node);
        last_write = Some(*s);
      }
    }
    for chain in self.first.iter_mut().chain(self.second.iter_mut()) {
      if let Some(p) = chain.position_mut(node) {
        p.last_ack_seqno = p.last_ack_seqno.max(seqno);
        if let Some(w) = last_write {
          p.seqno = p.seqno.max(w);
          p.last_write_seqno = w;
        }
      }
    }
  }

  /// Advance the active past locally satisfied writes
  /// 将活跃节点推进过本地已满足的写
  ///
  /// Writes needing persistence on the active are a fence until persisted.
  /// 需要在活跃节点持久化的写在持久化前构成屏障。
  fn update_hps(&mut self) -> Result<()> {
    let Some(active) = self.active_node() else {
      return Ok(());
    };
    let mut hps = self.hps.get();
    for (s, sw) in self.tracked.range(hps + 1..) {
      if sw.level().persist_on_active() && *s > self.persisted {
        break;
      }
      hps = *s;
    }
    self.hps.set(hps)?;
    self.advance_node(&active, hps);
    Ok(())
  }

  /// Commit satisfied writes from the front / 从队首提交已满足的写
  fn check_for_commit(&mut self, rq: &ResolvedQueue) -> Result<()> {
    while let Some(entry) = self.tracked.first_entry() {
      if !entry.get().is_satisfied() {
        break;
      }
      let sw = entry.remove();
      debug!("{} seqno {} satisfied", self.vbid, sw.seqno());
      rq.enqueue(sw, Resolution::Commit)?;
    }
    Ok(())
  }

  /// Abort every tracked write matching `doomed`, oldest first
  /// 从最旧开始中止所有满足 `doomed` 的跟踪写
  fn abort_where(
    &mut self,
    rq: &ResolvedQueue,
    why: &str,
    doomed: impl Fn(&SyncWrite) -> bool,
  ) -> Result<()> {
    let seqnos: Vec<Seqno> = self
      .tracked
      .iter()
      .filter(|(_, sw)| doomed(sw))
      .map(|(s, _)| *s)
      .collect();
    for seqno in seqnos {
      if let Some(sw) = self.tracked.remove(&seqno) {
        warn!("{} abort seqno {seqno}: {why}", self.vbid);
        rq.enqueue(sw, Resolution::Abort)?;
      }
    }
    Ok(())
  }

  fn reset_write_chains(&mut self) {
    let Some(first) = &self.first else {
      return;
    };
    let second = self.second.as_ref();
    let nodes: Vec<(NodeName, Seqno)> = first
      .positions()
      .chain(second.into_iter().flat_map(ReplicationChain::positions))
      .map(|(n, p)| (n.clone(), p.seqno))
      .collect();
    for (seqno, sw) in self.tracked.iter_mut() {
      sw.reset_chains(first, second);
      for (node, pos) in &nodes {
        if pos >= seqno {
          sw.ack(node);
        }
      }
    }
  }
}

pub struct ActiveDurabilityMonitor {
  vbid: Vbid,
  conf: ParsedConf,
  state: RwLock<State>,
  resolved: ResolvedQueue,
}

impl ActiveDurabilityMonitor {
  pub fn new(vbid: Vbid, conf: &[Conf]) -> Self {
    Self {
      vbid,
      conf: ParsedConf::new(conf),
      state: RwLock::new(State::new(vbid, 0, 0)),
      resolved: ResolvedQueue::new(0),
    }
  }

  /// Rebuild from persisted prepares; they never time out
  /// 由已持久化的预备写重建；它们永不超时
  pub fn from_warmup(vbid: Vbid, conf: &[Conf], outstanding: Outstanding) -> Result<Self> {
    let persisted = outstanding
      .prepares
      .iter()
      .map(|qi| qi.by_seqno)
      .max()
      .unwrap_or(0)
      .max(outstanding.hps);
    Self::from_outstanding(vbid, conf, outstanding, persisted)
  }

  /// Take over a replica's in-flight prepares on promotion
  /// 提升时接管副本的进行中预备写
  pub fn from_passive(
    pdm: PassiveDurabilityMonitor,
    conf: &[Conf],
    persisted: Seqno,
  ) -> Result<Self> {
    let vbid = pdm.vbid();
    Self::from_outstanding(vbid, conf, pdm.into_outstanding(), persisted)
  }

  /// Take over prepares handed over by another monitor; they never time out
  /// 接管其他监视器交出的预备写；它们永不超时
  pub fn from_outstanding(
    vbid: Vbid,
    conf: &[Conf],
    outstanding: Outstanding,
    persisted: Seqno,
  ) -> Result<Self> {
    let conf = ParsedConf::new(conf);
    let mut s = State::new(vbid, outstanding.hps, outstanding.hcs);
    s.persisted = persisted;
    let now = Instant::now();
    for item in outstanding.prepares {
      let level = item.durability.map(|r| r.level).unwrap_or_default();
      let reqs = Requirements::new(level, Timeout::Infinite);
      s.last_tracked.set(item.by_seqno)?;
      s.tracked.insert(
        item.by_seqno,
        SyncWrite::new(item, None, reqs, now, conf.default_timeout),
      );
    }
    info!(
      "{vbid} durability monitor from {} prepares, hps {} hcs {}",
      s.tracked.len(),
      s.hps.get(),
      s.hcs.get()
    );
    Ok(Self {
      vbid,
      conf,
      state: RwLock::new(s),
      resolved: ResolvedQueue::new(0),
    })
  }

  /// Hand remaining prepares to a replica monitor on demotion
  /// 降级时将剩余预备写交给副本监视器
  pub fn into_outstanding(self) -> Outstanding {
    let s = self.state.into_inner();
    Outstanding {
      hps: s.hps.get(),
      hcs: s.hcs.get(),
      prepares: s.tracked.into_values().map(|sw| sw.item().clone()).collect(),
    }
  }

  /// Copy of the in-flight prepares, leaving the monitor intact
  /// 进行中预备写的副本，监视器保持不变
  pub fn outstanding(&self) -> Outstanding {
    let s = self.state.read();
    Outstanding {
      hps: s.hps.get(),
      hcs: s.hcs.get(),
      prepares: s.tracked.values().map(|sw| sw.item().clone()).collect(),
    }
  }

  #[inline]
  pub fn vbid(&self) -> Vbid {
    self.vbid
  }

  /// Start tracking a prepare; requires a topology where durability is possible
  /// 开始跟踪预备写；要求拓扑可保证持久性
  pub fn add_sync_write(&self, cookie: Option<Cookie>, item: QueuedItem) -> Result<()> {
    let seqno = item.by_seqno;
    let reqs = item
      .durability
      .filter(Requirements::is_durable)
      .ok_or(Error::NotDurable {
        vbid: self.vbid,
        seqno,
      })?;

    let mut s = self.state.write();
    let Some(first) = &s.first else {
      return Err(Error::NoTopology(self.vbid));
    };
    if !s.is_durability_possible() {
      return Err(Error::DurabilityImpossible {
        vbid: self.vbid,
        seqno,
      });
    }
    let mut sw = SyncWrite::new(item, cookie, reqs, Instant::now(), self.conf.default_timeout);
    sw.reset_chains(first, s.second.as_ref());
    s.last_tracked.set(seqno)?;
    s.tracked.insert(seqno, sw);
    s.accepted += 1;

    s.update_hps()?;
    s.check_for_commit(&self.resolved)
  }

  /// Replica `node` has prepared everything up to `prepared_seqno`
  /// 副本 `node` 已预备至 `prepared_seqno`
  pub fn seqno_ack_received(&self, node: &str, prepared_seqno: Seqno) -> Result<()> {
    let mut s = self.state.write();
    let node = NodeName::from(node);
    if s.active_node().as_ref() == Some(&node) {
      let err = Error::AckFromActive {
        vbid: self.vbid,
        node,
      };
      error!("{err}");
      return Err(err);
    }
    if !s.in_topology(&node) {
      debug!("{} queue ack {prepared_seqno} from unknown {node}", self.vbid);
      let e = s.queued_acks.entry(node).or_default();
      *e = (*e).max(prepared_seqno);
      return Ok(());
    }
    s.advance_node(&node, prepared_seqno);
    s.check_for_commit(&self.resolved)
  }

  /// Local flush reached `persisted_seqno` / 本地刷盘到达 `persisted_seqno`
  pub fn notify_local_persistence(&self, persisted_seqno: Seqno) -> Result<()> {
    let mut s = self.state.write();
    s.persisted = s.persisted.max(persisted_seqno);
    s.update_hps()?;
    s.check_for_commit(&self.resolved)
  }

  /// Re-run the local advance and resolution / 重新执行本地推进与裁决
  pub fn check_for_commit(&self) -> Result<()> {
    let mut s = self.state.write();
    s.update_hps()?;
    s.check_for_commit(&self.resolved)
  }

  /// Validate then apply a new topology / 先校验再应用新拓扑
  pub fn set_replication_topology(&self, json: &str) -> Result<()> {
    let mut chains = parse_topology(json, self.conf.max_replicas)?.into_iter();
    let mut s = self.state.write();

    let mut first = ReplicationChain::new(
      ChainName::First,
      chains.next().unwrap_or_default(),
      self.conf.max_durability_replicas,
    );
    let mut second = chains
      .next()
      .map(|nodes| ReplicationChain::new(ChainName::Second, nodes, self.conf.max_durability_replicas));
    for old in s.second.iter().chain(s.first.iter()) {
      first.copy_positions_from(old);
      if let Some(c) = second.as_mut() {
        c.copy_positions_from(old);
      }
    }
    s.first = Some(first);
    s.second = second;
    s.topology = Some(json.to_owned());
    info!("{} topology {json}", self.vbid);

    s.reset_write_chains();
    if let Some(active) = s.active_node() {
      let hps = s.hps.get();
      s.advance_node(&active, hps);
    }

    let queued = std::mem::take(&mut s.queued_acks);
    let active = s.active_node();
    for (node, seqno) in queued {
      if s.in_topology(&node) && active.as_ref() != Some(&node) {
        s.advance_node(&node, seqno);
      } else {
        s.queued_acks.insert(node, seqno);
      }
    }

    if !s.is_durability_possible() {
      s.abort_where(&self.resolved, "durability impossible", |sw| !sw.is_infinite())?;
    }
    s.update_hps()?;
    s.check_for_commit(&self.resolved)
  }

  /// Abort every write past its deadline / 中止所有超过截止时间的写
  pub fn process_timeout(&self, now: Instant) -> Result<()> {
    let mut s = self.state.write();
    s.abort_where(&self.resolved, "timeout", |sw| sw.is_expired(now))?;
    s.check_for_commit(&self.resolved)
  }

  /// Apply resolved writes in order, outside the state lock
  /// 在状态锁之外按序应用已裁决的写
  ///
  /// A resolver failure is fatal: the write is already known to be safe.
  /// 执行失败是致命错误：该写已被确认为安全。
  pub fn process_completed_sync_write_queue(&self, resolver: &dyn SyncWriteResolver) -> Result<usize> {
    let guard = self.resolved.lock_consumer();
    let mut n = 0;
    while let Some(mut r) = self.resolved.try_dequeue(&guard) {
      let seqno = r.write.seqno();
      let cookie = r.write.take_cookie();
      let status = match r.resolution {
        Resolution::Commit => resolver.commit(r.write.key(), seqno, cookie),
        Resolution::Abort => resolver.abort(r.write.key(), seqno, cookie),
      };
      if !status.is_success() {
        let err = Error::ResolutionFailed {
          vbid: self.vbid,
          seqno,
          status,
        };
        error!("{err}");
        return Err(err);
      }

      let mut s = self.state.write();
      match r.resolution {
        Resolution::Commit => {
          s.last_committed.set(seqno)?;
          s.committed += 1;
        }
        Resolution::Abort => {
          s.last_aborted.set(seqno)?;
          s.aborted += 1;
        }
      }
      s.hcs.advance(seqno);
      n += 1;
    }
    Ok(n)
  }

  /// Take cookies of every in-flight write / 取走所有进行中写的 cookie
  pub fn get_cookies_for_in_flight_sync_writes(&self) -> Vec<Cookie> {
    let mut s = self.state.write();
    s.tracked
      .values_mut()
      .filter_map(SyncWrite::take_cookie)
      .collect()
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

  #[inline]
  pub fn last_tracked_seqno(&self) -> Seqno {
    self.state.read().last_tracked.get()
  }

  #[inline]
  pub fn last_committed_seqno(&self) -> Seqno {
    self.state.read().last_committed.get()
  }

  #[inline]
  pub fn last_aborted_seqno(&self) -> Seqno {
    self.state.read().last_aborted.get()
  }

  #[inline]
  pub fn is_durability_possible(&self) -> bool {
    self.state.read().is_durability_possible()
  }

  #[inline]
  pub fn has_topology(&self) -> bool {
    self.state.read().first.is_some()
  }

  /// Majority of the first chain / 首链的多数值
  #[inline]
  pub fn first_chain_majority(&self) -> Option<usize> {
    self.state.read().first.as_ref().map(ReplicationChain::majority)
  }

  /// Last tracked write `node` acked in the first chain / 首链中 `node` 最后确认的跟踪写
  pub fn node_write_seqno(&self, node: &str) -> Option<Seqno> {
    let s = self.state.read();
    s.first.as_ref()?.position(node).map(|p| p.last_write_seqno)
  }

  pub fn node_ack_seqno(&self, node: &str) -> Option<Seqno> {
    let s = self.state.read();
    s.first.as_ref()?.position(node).map(|p| p.last_ack_seqno)
  }

  #[inline]
  pub fn resolved_queue_len(&self) -> usize {
    self.resolved.len()
  }
}
