//! Durability monitor configuration
//! 持久性监视器配置

use coarsetime::Duration;

pub mod default {
  /// Replicas allowed in a topology chain / 拓扑链允许的副本数
  pub const MAX_REPLICAS: usize = 3;
  /// Replicas beyond which durability is impossible / 超过则无法保证持久性的副本数
  pub const MAX_DURABILITY_REPLICAS: usize = 2;
  pub const TIMEOUT_MS: u64 = 30000;
}

#[derive(Debug, Clone, Copy)]
pub enum Conf {
  MaxReplicas(usize),
  MaxDurabilityReplicas(usize),
  /// Timeout for writes asking for the default, in ms / 默认超时（毫秒）
  DefaultTimeout(u64),
}

#[derive(Debug, Clone, Copy)]
pub struct ParsedConf {
  pub max_replicas: usize,
  pub max_durability_replicas: usize,
  pub default_timeout: Duration,
}

impl Default for ParsedConf {
  fn default() -> Self {
    Self {
      max_replicas: default::MAX_REPLICAS,
      max_durability_replicas: default::MAX_DURABILITY_REPLICAS,
      default_timeout: Duration::from_millis(default::TIMEOUT_MS),
    }
  }
}

impl ParsedConf {
  pub fn new(conf: &[Conf]) -> Self {
    let mut c = Self::default();
    for item in conf {
      match *item {
        Conf::MaxReplicas(v) => c.max_replicas = v,
        Conf::MaxDurabilityReplicas(v) => c.max_durability_replicas = v,
        Conf::DefaultTimeout(ms) => c.default_timeout = Duration::from_millis(ms),
      }
    }
    c
  }
}
