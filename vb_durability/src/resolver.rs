//! Collaborators supplied by the owning vBucket
//! 由所属 vBucket 提供的协作者

use vb_base::{Cookie, DocKey, Seqno, Status, Vbid};

/// Applies resolved sync writes to the vBucket / 将已裁决的同步写应用到 vBucket
pub trait SyncWriteResolver {
  fn commit(&self, key: &DocKey, prepare_seqno: Seqno, cookie: Option<Cookie>) -> Status;
  fn abort(&self, key: &DocKey, prepare_seqno: Seqno, cookie: Option<Cookie>) -> Status;
}

/// Receives replica seqno acks / 接收副本序列号确认
pub trait SeqnoAckSink: Send + Sync {
  fn seqno_ack(&self, vbid: Vbid, prepared_seqno: Seqno);
}
