//! Error types for checkpoint operations
//! 检查点操作的错误类型

use thiserror::Error;
use vb_base::{CheckpointId, QueueOp, Seqno, Vbid};

#[derive(Debug, Error)]
pub enum Error {
  #[error("checkpoint {id} is not open, cannot queue {op}")]
  NotOpen { id: CheckpointId, op: QueueOp },

  #[error("{vbid} retry into new checkpoint {id} still hit a duplicate")]
  DuplicateAfterRetry { vbid: Vbid, id: CheckpointId },

  #[error("{vbid} seqno {new} not greater than last {last}")]
  SeqnoNotIncreasing { vbid: Vbid, last: Seqno, new: Seqno },

  #[error("{vbid} cannot extend checkpoint {id}: open checkpoint is not Memory")]
  ExtendNotMemory { vbid: Vbid, id: CheckpointId },

  #[error("{vbid} snapshot end {end} below start {start}")]
  BadSnapshot { vbid: Vbid, start: Seqno, end: Seqno },

  #[error("cursor not found: {0}")]
  CursorNotFound(String),

  #[error("checkpoint {id}: nothing to expel")]
  NothingToExpel { id: CheckpointId },

  #[error("checkpoint {id}: last item cannot be expelled")]
  ExpelLast { id: CheckpointId },

  #[error("{0}")]
  Base(#[from] vb_base::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
