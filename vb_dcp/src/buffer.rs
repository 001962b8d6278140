//! FIFO of deferred messages with byte accounting
//! 带字节计量的延后消息队列

use std::collections::VecDeque;

use crate::DcpResponse;

#[derive(Debug, Default)]
pub(crate) struct Buffer {
  messages: VecDeque<(DcpResponse, usize)>,
  bytes: usize,
}

impl Buffer {
  pub fn push(&mut self, msg: DcpResponse, size: usize) {
    self.bytes += size;
    self.messages.push_back((msg, size));
  }

  /// Copy of the oldest message, left in place while it is applied
  /// 最旧消息的副本，应用期间仍留在队列中
  #[inline]
  pub fn front(&self) -> Option<(DcpResponse, usize)> {
    self.messages.front().cloned()
  }

  /// Drop the oldest message, returning its bytes / 丢弃最旧消息并返回其字节数
  pub fn pop_front(&mut self) -> Option<usize> {
    let (_, size) = self.messages.pop_front()?;
    self.bytes -= size;
    Some(size)
  }

  pub fn clear(&mut self) -> usize {
    self.messages.clear();
    std::mem::take(&mut self.bytes)
  }

  #[inline]
  pub fn is_empty(&self) -> bool {
    self.messages.is_empty()
  }

  #[inline]
  pub fn len(&self) -> usize {
    self.messages.len()
  }

  #[inline]
  pub fn bytes(&self) -> usize {
    self.bytes
  }
}
