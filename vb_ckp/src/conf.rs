//! Checkpoint manager configuration
//! 检查点管理器配置

/// Default configuration values / 默认配置值
pub mod default {
  pub const MAX_ITEMS: usize = 10000;
  pub const REMOVE_BATCH: usize = 16;
  pub const EXPEL: bool = true;
}

#[derive(Debug, Clone, Copy)]
pub enum Conf {
  /// Items in the open checkpoint before an active vBucket starts a new one
  /// 活跃 vBucket 开启新检查点前，打开检查点可容纳的条目数
  MaxItems(usize),
  /// Default limit for one removal pass / 单次删除的默认上限
  RemoveBatch(usize),
  /// Allow expelling consumed items / 允许驱逐已消费条目
  Expel(bool),
}

/// Parsed configuration / 解析后的配置
#[derive(Debug, Clone, Copy)]
pub struct ParsedConf {
  pub max_items: usize,
  pub remove_batch: usize,
  pub expel: bool,
}

impl Default for ParsedConf {
  fn default() -> Self {
    Self {
      max_items: default::MAX_ITEMS,
      remove_batch: default::REMOVE_BATCH,
      expel: default::EXPEL,
    }
  }
}

impl ParsedConf {
  pub fn new(conf: &[Conf]) -> Self {
    let mut c = Self::default();
    for item in conf {
      match *item {
        Conf::MaxItems(v) => c.max_items = v.max(1),
        Conf::RemoveBatch(v) => c.remove_batch = v.max(1),
        Conf::Expel(v) => c.expel = v,
      }
    }
    c
  }
}
