//! Tracked synchronous write / 被跟踪的同步写

use std::collections::HashSet;

use coarsetime::{Duration, Instant};
use vb_base::{Cookie, DocKey, Level, NodeName, QueuedItem, Requirements, Seqno, Timeout};

use crate::ReplicationChain;

/// Quorum of one chain as seen by a write / 写入所见的单链法定数
#[derive(Debug, Clone)]
struct ChainQuorum {
  active: Option<NodeName>,
  nodes: Vec<NodeName>,
  majority: usize,
}

impl ChainQuorum {
  fn of(chain: &ReplicationChain) -> Self {
    Self {
      active: chain.active().cloned(),
      nodes: chain.defined().cloned().collect(),
      majority: chain.majority(),
    }
  }

  fn is_satisfied(&self, acks: &HashSet<NodeName>) -> bool {
    self.active.as_ref().is_some_and(|a| acks.contains(a))
      && self.nodes.iter().filter(|n| acks.contains(*n)).count() >= self.majority
  }
}

#[derive(Debug)]
pub struct SyncWrite {
  item: QueuedItem,
  cookie: Option<Cookie>,
  reqs: Requirements,
  start: Instant,
  expiry: Option<Instant>,
  acks: HashSet<NodeName>,
  chains: Vec<ChainQuorum>,
}

impl SyncWrite {
  pub(crate) fn new(
    item: QueuedItem,
    cookie: Option<Cookie>,
    reqs: Requirements,
    start: Instant,
    default_timeout: Duration,
  ) -> Self {
    let expiry = match reqs.timeout {
      Timeout::Infinite => None,
      Timeout::Default => Some(start + default_timeout),
      Timeout::Millis(ms) => Some(start + Duration::from_millis(u64::from(ms))),
    };
    Self {
      item,
      cookie,
      reqs,
      start,
      expiry,
      acks: HashSet::new(),
      chains: Vec::new(),
    }
  }

  /// Replace chains and forget acks / 替换复制链并清空确认
  pub(crate) fn reset_chains(&mut self, first: &ReplicationChain, second: Option<&ReplicationChain>) {
    self.chains = std::iter::once(first)
      .chain(second)
      .map(ChainQuorum::of)
      .collect();
    self.acks.clear();
  }

  /// Record an ack from a node of any chain / 记录任一链中节点的确认
  pub(crate) fn ack(&mut self, node: &NodeName) {
    if self.chains.iter().any(|c| c.nodes.contains(node)) {
      self.acks.insert(node.clone());
    }
  }

  /// Active acked and every chain reached majority / 活跃节点已确认且每条链达到多数
  pub fn is_satisfied(&self) -> bool {
    !self.chains.is_empty() && self.chains.iter().all(|c| c.is_satisfied(&self.acks))
  }

  #[inline]
  pub fn is_expired(&self, now: Instant) -> bool {
    self.expiry.is_some_and(|e| e <= now)
  }

  #[inline]
  pub fn is_infinite(&self) -> bool {
    self.expiry.is_none()
  }

  #[inline]
  pub fn seqno(&self) -> Seqno {
    self.item.by_seqno
  }

  #[inline]
  pub fn key(&self) -> &DocKey {
    &self.item.key
  }

  #[inline]
  pub fn item(&self) -> &QueuedItem {
    &self.item
  }

  #[inline]
  pub fn level(&self) -> Level {
    self.reqs.level
  }

  #[inline]
  pub fn requirements(&self) -> Requirements {
    self.reqs
  }

  #[inline]
  pub fn cookie(&self) -> Option<Cookie> {
    self.cookie
  }

  /// Take the cookie so no second notification can use it
  /// 取走 cookie，避免二次通知
  #[inline]
  pub fn take_cookie(&mut self) -> Option<Cookie> {
    self.cookie.take()
  }

  #[inline]
  pub fn start(&self) -> Instant {
    self.start
  }

  #[inline]
  pub fn ack_count(&self) -> usize {
    self.acks.len()
  }

  #[inline]
  pub fn is_acked_by(&self, node: &str) -> bool {
    self.acks.contains(node)
  }
}
