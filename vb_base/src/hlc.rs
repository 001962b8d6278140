//! Hybrid logical clock for cas generation
//! 用于生成 CAS 的混合逻辑时钟

use std::sync::atomic::{AtomicU64, Ordering};

use crate::Cas;

/// Strictly increasing cas source: wall clock ns, bumped on ties
/// 严格递增的 CAS 来源：墙钟纳秒，冲突时加一
#[derive(Debug, Default)]
pub struct Hlc {
  max: AtomicU64,
}

impl Hlc {
  #[inline]
  pub fn new() -> Self {
    Self::default()
  }

  /// Seed after warmup or takeover / 预热或接管后设置初值
  #[inline]
  pub fn set_max(&self, cas: Cas) {
    self.max.fetch_max(cas, Ordering::AcqRel);
  }

  pub fn next_cas(&self) -> Cas {
    let now = coarsetime::Clock::now_since_epoch().as_nanos();
    let mut cur = self.max.load(Ordering::Acquire);
    loop {
      let next = now.max(cur + 1);
      match self
        .max
        .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
      {
        Ok(_) => return next,
        Err(actual) => cur = actual,
      }
    }
  }

  #[inline]
  pub fn max_cas(&self) -> Cas {
    self.max.load(Ordering::Acquire)
  }
}
