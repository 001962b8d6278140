#![cfg_attr(docsrs, feature(doc_cfg))]

//! vb_base - Shared types for the vBucket replication core
//! vBucket 复制核心的共享类型
//!
//! Item model, sequence numbers, durability requirements and monotonic counters.
//! 条目模型、序列号、持久性要求与单调计数器。

mod durability;
mod error;
mod hlc;
pub mod item;
mod monotonic;
mod status;
mod types;

pub use durability::{Level, Requirements, Timeout};
pub use error::{Error, Result};
pub use hlc::Hlc;
pub use item::{DocKey, Item, QueueOp, QueuedItem, doc_key};
pub use monotonic::{Monotonic, WeaklyMonotonic};
pub use status::Status;
pub use types::{Cas, CheckpointId, Cookie, NodeName, Seqno, VBucketState, Vbid};
