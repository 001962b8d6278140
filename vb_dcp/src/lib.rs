#![cfg_attr(docsrs, feature(doc_cfg))]

//! vb_dcp - Replica-side change stream consumer
//! 副本端变更流消费者
//!
//! [`PassiveStream`] validates ordering, applies messages to a
//! [`ReplicaVBucket`] or buffers them under memory pressure, and turns
//! snapshot markers into checkpoints.
//! [`PassiveStream`] 校验顺序，将消息应用到 [`ReplicaVBucket`] 或在内存压力下缓冲，
//! 并把快照标记转为检查点。

mod buffer;
pub mod conf;
pub mod error;
pub mod message;
mod replica;
pub mod stream;
pub mod throttle;

pub use conf::{Conf, ParsedConf};
pub use error::{Error, Result};
pub use message::{DcpResponse, EndReason, ReadyMessage, SnapshotMarker, marker_flag};
pub use replica::ReplicaVBucket;
pub use stream::{Drained, PassiveStream, SnapshotType, StreamState};
pub use throttle::{MemoryThrottle, ReplicationThrottle, ThrottleStatus};
