//! Error types for durability tracking
//! 持久性跟踪的错误类型

use thiserror::Error;
use vb_base::{NodeName, Seqno, Status, Vbid};

use crate::ChainName;

#[derive(Debug, Error)]
pub enum Error {
  #[error("topology json: {0}")]
  TopologyJson(#[from] serde_json::Error),

  #[error("topology must have 1 or 2 chains, got {0}")]
  ChainCount(usize),

  #[error("{0} chain is empty")]
  ChainEmpty(ChainName),

  #[error("{chain} chain has {len} nodes, max {max}")]
  ChainTooLarge {
    chain: ChainName,
    len: usize,
    max: usize,
  },

  #[error("{0} chain has no active node")]
  ChainNoActive(ChainName),

  #[error("{chain} chain lists node {node} twice")]
  DuplicateNode { chain: ChainName, node: NodeName },

  #[error("{0} has no replication topology")]
  NoTopology(Vbid),

  #[error("{vbid} durability impossible for seqno {seqno}")]
  DurabilityImpossible { vbid: Vbid, seqno: Seqno },

  #[error("{vbid} seqno {seqno} carries no durability requirements")]
  NotDurable { vbid: Vbid, seqno: Seqno },

  #[error("{vbid} seqno ack from active node {node}")]
  AckFromActive { vbid: Vbid, node: NodeName },

  #[error("{vbid} resolving seqno {seqno} failed: {status}")]
  ResolutionFailed {
    vbid: Vbid,
    seqno: Seqno,
    status: Status,
  },

  #[error("{vbid} no tracked prepare for {key} (seqno {seqno:?})")]
  UnknownPrepare {
    vbid: Vbid,
    key: String,
    seqno: Option<Seqno>,
  },

  #[error("{0}")]
  Base(#[from] vb_base::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
