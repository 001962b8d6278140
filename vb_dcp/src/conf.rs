//! Stream configuration
//! 流配置

pub mod default {
  /// Buffered messages applied per drain / 每次排空应用的缓冲消息数
  pub const BATCH_SIZE: usize = 10;
}

#[derive(Debug, Clone, Copy)]
pub enum Conf {
  BatchSize(usize),
  /// Buffer every message, even when the throttle allows processing
  /// 即使限流允许处理也缓冲所有消息
  AlwaysBuffer(bool),
  /// Producer supports synchronous replication / 生产者支持同步复制
  SyncReplication(bool),
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedConf {
  pub batch_size: usize,
  pub always_buffer: bool,
  pub sync_replication: bool,
}

impl Default for ParsedConf {
  fn default() -> Self {
    Self {
      batch_size: default::BATCH_SIZE,
      always_buffer: false,
      sync_replication: true,
    }
  }
}

impl ParsedConf {
  pub fn new(conf: &[Conf]) -> Self {
    let mut c = Self::default();
    for item in conf {
      match *item {
        Conf::BatchSize(v) => c.batch_size = v.max(1),
        Conf::AlwaysBuffer(v) => c.always_buffer = v,
        Conf::SyncReplication(v) => c.sync_replication = v,
      }
    }
    c
  }
}
