//! Error types / 错误类型

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("config: {0}")]
  Conf(#[from] serde_json::Error),

  #[error("checkpoint: {0}")]
  Ckp(#[from] vb_ckp::Error),

  #[error("durability: {0}")]
  Durability(#[from] vb_durability::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
