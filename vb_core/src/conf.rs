//! vBucket configuration 配置

use serde::{Deserialize, Serialize};

use crate::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VBucketConf {
  /// Items in an active open checkpoint before a new one 活跃打开检查点的条目上限
  pub checkpoint_max_items: usize,
  /// Closed checkpoints removed per flush 每次刷盘删除的已关闭检查点数
  pub checkpoint_remove_batch: usize,
  pub checkpoint_expel: bool,
  pub max_replicas: usize,
  pub max_durability_replicas: usize,
  /// Default sync write timeout in ms 同步写默认超时（毫秒）
  pub durability_timeout_ms: u64,
  pub dcp_batch_size: usize,
  pub dcp_always_buffer: bool,
  /// Producer supports synchronous replication 生产者支持同步复制
  pub sync_replication: bool,
  /// Lock stripes of the hash table 哈希表锁分段数
  pub hash_stripes: usize,
  /// Items read per flush 每次刷盘读取的条目数
  pub flush_batch: usize,
}

impl Default for VBucketConf {
  fn default() -> Self {
    Self {
      checkpoint_max_items: vb_ckp::conf::default::MAX_ITEMS,
      checkpoint_remove_batch: vb_ckp::conf::default::REMOVE_BATCH,
      checkpoint_expel: vb_ckp::conf::default::EXPEL,
      max_replicas: vb_durability::conf::default::MAX_REPLICAS,
      max_durability_replicas: vb_durability::conf::default::MAX_DURABILITY_REPLICAS,
      durability_timeout_ms: vb_durability::conf::default::TIMEOUT_MS,
      dcp_batch_size: vb_dcp::conf::default::BATCH_SIZE,
      dcp_always_buffer: false,
      sync_replication: true,
      hash_stripes: 16,
      flush_batch: 1000,
    }
  }
}

impl VBucketConf {
  /// Missing fields take defaults 缺失字段取默认值
  pub fn from_json(json: &str) -> Result<Self> {
    Ok(serde_json::from_str(json)?)
  }

  pub fn ckp(&self) -> [vb_ckp::Conf; 3] {
    [
      vb_ckp::Conf::MaxItems(self.checkpoint_max_items),
      vb_ckp::Conf::RemoveBatch(self.checkpoint_remove_batch),
      vb_ckp::Conf::Expel(self.checkpoint_expel),
    ]
  }

  pub fn durability(&self) -> [vb_durability::Conf; 3] {
    [
      vb_durability::Conf::MaxReplicas(self.max_replicas),
      vb_durability::Conf::MaxDurabilityReplicas(self.max_durability_replicas),
      vb_durability::Conf::DefaultTimeout(self.durability_timeout_ms),
    ]
  }

  pub fn dcp(&self) -> [vb_dcp::Conf; 3] {
    [
      vb_dcp::Conf::BatchSize(self.dcp_batch_size),
      vb_dcp::Conf::AlwaysBuffer(self.dcp_always_buffer),
      vb_dcp::Conf::SyncReplication(self.sync_replication),
    ]
  }
}
