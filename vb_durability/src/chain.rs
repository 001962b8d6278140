//! Replication chain with per-node ack positions
//! 带逐节点确认位置的复制链

use std::{collections::HashMap, fmt};

use vb_base::{NodeName, Seqno};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainName {
  First,
  Second,
}

impl ChainName {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::First => "first",
      Self::Second => "second",
    }
  }
}

impl fmt::Display for ChainName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How far a node got through tracked writes / 节点在跟踪写中的进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
  /// Highest tracked seqno the node has covered / 节点已覆盖的最高跟踪序列号
  pub seqno: Seqno,
  /// Seqno of the last tracked write it acked / 最后确认的跟踪写序列号
  pub last_write_seqno: Seqno,
  /// Seqno carried by its last ack / 最后一次确认携带的序列号
  pub last_ack_seqno: Seqno,
}

#[derive(Debug, Clone)]
pub struct ReplicationChain {
  name: ChainName,
  nodes: Vec<Option<NodeName>>,
  majority: usize,
  max_durability_replicas: usize,
  positions: HashMap<NodeName, Position>,
}

impl ReplicationChain {
  pub fn new(name: ChainName, nodes: Vec<Option<NodeName>>, max_durability_replicas: usize) -> Self {
    let positions = nodes
      .iter()
      .flatten()
      .map(|n| (n.clone(), Position::default()))
      .collect();
    Self {
      name,
      majority: nodes.len() / 2 + 1,
      nodes,
      max_durability_replicas,
      positions,
    }
  }

  #[inline]
  pub fn name(&self) -> ChainName {
    self.name
  }

  /// First node, where writes are accepted / 首节点，接受写入
  #[inline]
  pub fn active(&self) -> Option<&NodeName> {
    self.nodes.first().and_then(Option::as_ref)
  }

  /// Defined nodes in chain order / 按链顺序的已定义节点
  pub fn defined(&self) -> impl Iterator<Item = &NodeName> {
    self.nodes.iter().flatten()
  }

  #[inline]
  pub fn size(&self) -> usize {
    self.nodes.len()
  }

  #[inline]
  pub fn majority(&self) -> usize {
    self.majority
  }

  /// Enough defined nodes for a majority, and not too many replicas
  /// 已定义节点足以构成多数，且副本数不超限
  pub fn is_durability_possible(&self) -> bool {
    self.positions.len() >= self.majority && self.nodes.len() <= 1 + self.max_durability_replicas
  }

  #[inline]
  pub fn contains(&self, node: &str) -> bool {
    self.positions.contains_key(node)
  }

  #[inline]
  pub fn position(&self, node: &str) -> Option<&Position> {
    self.positions.get(node)
  }

  #[inline]
  pub(crate) fn position_mut(&mut self, node: &str) -> Option<&mut Position> {
    self.positions.get_mut(node)
  }

  pub fn positions(&self) -> impl Iterator<Item = (&NodeName, &Position)> {
    self.positions.iter()
  }

  /// Carry positions over by node name / 按节点名沿用位置
  pub(crate) fn copy_positions_from(&mut self, old: &ReplicationChain) {
    for (node, pos) in self.positions.iter_mut() {
      if let Some(p) = old.positions.get(node) {
        *pos = *p;
      }
    }
  }
}
