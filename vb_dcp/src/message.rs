//! Inbound change-stream messages and outbound replies
//! 入站变更流消息与出站回复
//!
//! One sum type covers every inbound message so the stream dispatches with an
//! exhaustive match.
//! 用一个和类型覆盖所有入站消息，流以穷尽匹配分发。

use vb_base::{DocKey, Item, Seqno, Status, VBucketState, Vbid};

/// Snapshot marker flags / 快照标记标志位
pub mod marker_flag {
  pub const MEMORY: u32 = 0x01;
  pub const DISK: u32 = 0x02;
  /// Start a new checkpoint / 开启新检查点
  pub const CHK: u32 = 0x04;
  /// Producer waits for a marker response / 生产者等待标记回复
  pub const ACK: u32 = 0x08;
  pub const HISTORY: u32 = 0x10;
  pub const MAY_CONTAIN_DUPLICATE_KEYS: u32 = 0x20;
}

/// Fixed request header of the wire protocol / 协议固定请求头
const HEADER: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotMarker {
  pub start: Seqno,
  pub end: Seqno,
  pub flags: u32,
  /// High completed seqno, sent for disk snapshots / 高完成序列号，磁盘快照携带
  pub hcs: Option<Seqno>,
  /// Max visible seqno / 最大可见序列号
  pub mvs: Option<Seqno>,
}

impl SnapshotMarker {
  pub const fn new(start: Seqno, end: Seqno, flags: u32) -> Self {
    Self {
      start,
      end,
      flags,
      hcs: None,
      mvs: None,
    }
  }

  #[inline]
  pub const fn with_hcs(mut self, hcs: Seqno) -> Self {
    self.hcs = Some(hcs);
    self
  }

  #[inline]
  pub const fn with_mvs(mut self, mvs: Seqno) -> Self {
    self.mvs = Some(mvs);
    self
  }

  #[inline]
  pub const fn is_disk(&self) -> bool {
    self.flags & marker_flag::DISK != 0
  }

  #[inline]
  pub const fn is_checkpoint(&self) -> bool {
    self.flags & marker_flag::CHK != 0
  }

  #[inline]
  pub const fn needs_ack(&self) -> bool {
    self.flags & marker_flag::ACK != 0
  }

  #[inline]
  pub const fn is_history(&self) -> bool {
    self.flags & marker_flag::HISTORY != 0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
  Ok,
  Closed,
  StateChanged,
  Disconnected,
  Slow,
  Rollback,
}

#[derive(Debug, Clone)]
pub enum DcpResponse {
  Mutation(Item),
  Deletion(Item),
  Expiration(Item),
  Prepare(Item),
  Commit {
    key: DocKey,
    prepare_seqno: Seqno,
    commit_seqno: Seqno,
  },
  Abort {
    key: DocKey,
    prepare_seqno: Seqno,
    abort_seqno: Seqno,
  },
  SnapshotMarker(SnapshotMarker),
  SetVBucketState(VBucketState),
  SystemEvent(Item),
  /// Producer skipped filtered seqnos up to here / 生产者跳过过滤掉的序列号至此
  SeqnoAdvanced(Seqno),
  StreamEnd(EndReason),
}

impl DcpResponse {
  /// Seqno the message occupies, if any / 消息占用的序列号
  pub fn by_seqno(&self) -> Option<Seqno> {
    match self {
      Self::Mutation(it)
      | Self::Deletion(it)
      | Self::Expiration(it)
      | Self::Prepare(it)
      | Self::SystemEvent(it) => Some(it.by_seqno),
      Self::Commit { commit_seqno, .. } => Some(*commit_seqno),
      Self::Abort { abort_seqno, .. } => Some(*abort_seqno),
      Self::SeqnoAdvanced(s) => Some(*s),
      Self::SnapshotMarker(_) | Self::SetVBucketState(_) | Self::StreamEnd(_) => None,
    }
  }

  /// Metered bytes for flow control / 流控计量字节数
  pub fn message_size(&self) -> usize {
    match self {
      Self::Mutation(it) | Self::Expiration(it) => HEADER + 31 + it.key.len() + it.value.len(),
      Self::Deletion(it) => HEADER + 18 + it.key.len() + it.value.len(),
      Self::Prepare(it) => HEADER + 31 + it.key.len() + it.value.len(),
      Self::SystemEvent(it) => HEADER + 13 + it.key.len() + it.value.len(),
      Self::Commit { key, .. } => HEADER + 16 + key.len(),
      Self::Abort { key, .. } => HEADER + 24 + key.len(),
      Self::SnapshotMarker(m) => {
        HEADER + if m.hcs.is_some() || m.mvs.is_some() { 36 } else { 20 }
      }
      Self::SetVBucketState(_) => HEADER + 1,
      Self::SeqnoAdvanced(_) => HEADER + 8,
      Self::StreamEnd(_) => HEADER + 4,
    }
  }

  pub const fn name(&self) -> &'static str {
    match self {
      Self::Mutation(_) => "mutation",
      Self::Deletion(_) => "deletion",
      Self::Expiration(_) => "expiration",
      Self::Prepare(_) => "prepare",
      Self::Commit { .. } => "commit",
      Self::Abort { .. } => "abort",
      Self::SnapshotMarker(_) => "snapshot_marker",
      Self::SetVBucketState(_) => "set_vbucket_state",
      Self::SystemEvent(_) => "system_event",
      Self::SeqnoAdvanced(_) => "seqno_advanced",
      Self::StreamEnd(_) => "stream_end",
    }
  }
}

/// Outbound replies queued by the stream / 流排队的出站回复
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyMessage {
  StreamRequest {
    vbid: Vbid,
    opaque: u32,
    start_seqno: Seqno,
    snap_start: Seqno,
    snap_end: Seqno,
  },
  AddStreamResponse {
    opaque: u32,
    stream_opaque: u32,
    status: Status,
  },
  SnapshotMarkerResponse {
    opaque: u32,
    status: Status,
  },
  SetVBucketStateResponse {
    opaque: u32,
    status: Status,
  },
  SeqnoAck {
    vbid: Vbid,
    prepared_seqno: Seqno,
  },
}
