#![cfg_attr(docsrs, feature(doc_cfg))]

//! vb_core - vBucket wiring
//! vBucket 组装
//!
//! Client writes go through the hash table into the checkpoint manager and,
//! when durable, the active durability monitor. Replicated messages arrive
//! through [`vb_dcp::ReplicaVBucket`], implemented here.
//! 客户端写经哈希表进入检查点管理器，持久写再进入活跃持久性监视器；
//! 复制消息经此处实现的 [`vb_dcp::ReplicaVBucket`] 到达。

pub mod conf;
pub mod error;
pub mod hash_table;
mod notify;
pub mod vbucket;

pub use conf::VBucketConf;
pub use error::{Error, Result};
pub use hash_table::{HashTable, StoredValue, Stripe};
pub use notify::{ClientNotifier, Store};
pub use vbucket::{Flushed, VBucket};
