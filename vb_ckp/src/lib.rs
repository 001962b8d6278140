#![cfg_attr(docsrs, feature(doc_cfg))]

//! Per-vBucket checkpoint queue: de-duplicating checkpoints read by named cursors
//! 单 vBucket 检查点队列：去重检查点与具名游标

pub mod checkpoint;
pub mod conf;
pub mod cursor;
pub mod error;
pub mod manager;
pub mod snapshot;

pub use checkpoint::{Checkpoint, MemCallback, Pos, QueueDirtyResult, QueueDirtyStatus};
pub use conf::{Conf, ParsedConf};
pub use cursor::{CheckpointCursor, CursorName, PERSISTENCE_CURSOR};
pub use error::{Error, Result};
pub use manager::{
  CheckpointManager, CheckpointRange, ExpelResult, FlusherNotify, GenerateBySeqno, ItemsForCursor,
  Queued, RegisterResult, RemoveResult, SnapshotSpec,
};
pub use snapshot::{CheckpointState, CheckpointType, SnapshotInfo, SnapshotRange};
