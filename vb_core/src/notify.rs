//! Collaborators the vBucket calls out to
//! vBucket 调用的外部协作者

use vb_base::{Cookie, QueuedItem, Status, Vbid};

/// Completes blocked client requests / 完成被阻塞的客户端请求
pub trait ClientNotifier: Send + Sync {
  fn notify_io_complete(&self, cookie: Cookie, status: Status);
}

/// Durable storage written by the flusher / 刷盘器写入的持久存储
pub trait Store: Send + Sync {
  fn write(&self, vbid: Vbid, items: &[QueuedItem]);
}
