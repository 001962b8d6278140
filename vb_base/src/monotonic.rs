//! Monotonic counters / 单调计数器

use crate::{Error, Result};

/// Counter that rejects regressions; STRICT also rejects equal values
/// 拒绝回退的计数器；STRICT 时也拒绝相等值
#[derive(Debug, Clone, Copy)]
pub struct Mono<const STRICT: bool> {
  val: u64,
  label: &'static str,
}

/// Strictly increasing / 严格递增
pub type Monotonic = Mono<true>;
/// Non-decreasing / 非递减
pub type WeaklyMonotonic = Mono<false>;

impl<const STRICT: bool> Mono<STRICT> {
  #[inline]
  pub const fn new(label: &'static str, val: u64) -> Self {
    Self { val, label }
  }

  #[inline]
  pub const fn get(&self) -> u64 {
    self.val
  }

  /// Update, failing on regression / 更新，回退时报错
  pub fn set(&mut self, new: u64) -> Result<()> {
    let ok = if STRICT { new > self.val } else { new >= self.val };
    if !ok {
      return Err(Error::NonMonotonic {
        label: self.label,
        cur: self.val,
        new,
      });
    }
    self.val = new;
    Ok(())
  }

  /// Move forward if larger, ignore otherwise / 更大时前进，否则忽略
  #[inline]
  pub fn advance(&mut self, new: u64) -> bool {
    if new > self.val {
      self.val = new;
      return true;
    }
    false
  }

  /// Bypass the check (reset paths only) / 跳过检查（仅重置路径）
  #[inline]
  pub fn reset(&mut self, val: u64) {
    self.val = val;
  }
}
