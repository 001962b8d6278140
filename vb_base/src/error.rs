//! Error types / 错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Counter moved backwards (or stood still for a strict counter)
  /// 计数器回退（严格计数器不允许持平）
  #[error("{label}: non-monotonic update {new} after {cur}")]
  NonMonotonic {
    label: &'static str,
    cur: u64,
    new: u64,
  },
}

pub type Result<T> = std::result::Result<T, Error>;
