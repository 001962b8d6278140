#![cfg_attr(docsrs, feature(doc_cfg))]

//! Synchronous replication tracking for one vBucket
//! 单个 vBucket 的同步复制跟踪
//!
//! The active side tallies replica acks against each chain's majority and
//! resolves writes through [`ResolvedQueue`]. The replica side tracks received
//! prepares and acks its high prepared seqno.
//! 活跃端按每条链的多数统计副本确认，并通过 [`ResolvedQueue`] 裁决写入；
//! 副本端跟踪收到的预备写并确认其最高预备序列号。

pub mod active;
pub mod chain;
pub mod conf;
pub mod error;
mod outstanding;
pub mod passive;
pub mod resolved_queue;
mod resolver;
pub mod sync_write;
pub mod topology;

pub use active::ActiveDurabilityMonitor;
pub use chain::{ChainName, Position, ReplicationChain};
pub use conf::{Conf, ParsedConf};
pub use error::{Error, Result};
pub use outstanding::Outstanding;
pub use passive::PassiveDurabilityMonitor;
pub use resolved_queue::{ConsumerGuard, Resolution, Resolved, ResolvedQueue};
pub use resolver::{SeqnoAckSink, SyncWriteResolver};
pub use sync_write::SyncWrite;
pub use topology::parse_topology;
