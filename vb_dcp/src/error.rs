//! Error types / 错误类型

use thiserror::Error;
use vb_base::{Seqno, Vbid};

#[derive(Debug, Error)]
pub enum Error {
  /// Producer sent a marker whose visible end lies past its end
  /// 生产者发送的快照标记可见终点超过其终点
  #[error("{vbid} snapshot max visible seqno {mvs} beyond end {end}")]
  VisibleBeyondEnd { vbid: Vbid, mvs: Seqno, end: Seqno },

  #[error("checkpoint: {0}")]
  Ckp(#[from] vb_ckp::Error),

  #[error("durability: {0}")]
  Durability(#[from] vb_durability::Error),

  #[error("{0}")]
  Base(#[from] vb_base::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
