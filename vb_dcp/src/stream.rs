//! Replica-side consumer of one vBucket's change stream
//! 单个 vBucket 变更流的副本端消费者
//!
//! Lock order: buffer, then state. The buffer lock is never held while a
//! message is applied.
//! 锁顺序：先缓冲区，后状态。应用消息时从不持有缓冲区锁。

mod apply;
mod stat;

use std::{
  collections::VecDeque,
  fmt,
  sync::{
    Arc, Weak,
    atomic::{AtomicUsize, Ordering},
  },
};

use log::{debug, info, warn};
use parking_lot::Mutex;
use vb_base::{Monotonic, Seqno, Status, Vbid};
use vb_ckp::SnapshotRange;
use vb_durability::SeqnoAckSink;

use crate::{
  Conf, DcpResponse, EndReason, ParsedConf, ReadyMessage, ReplicaVBucket, ReplicationThrottle,
  Result, ThrottleStatus, buffer::Buffer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
  Pending,
  Reading,
  /// Terminal, inbound messages are dropped / 终态，入站消息被丢弃
  Dead,
}

impl StreamState {
  pub const fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "pending",
      Self::Reading => "reading",
      Self::Dead => "dead",
    }
  }
}

impl fmt::Display for StreamState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Type of the snapshot being received / 正在接收的快照类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotType {
  #[default]
  None,
  Memory,
  Disk,
}

struct State {
  status: StreamState,
  last_seqno: Monotonic,
  snap: SnapshotRange,
  snap_type: SnapshotType,
  /// A prepare was applied in the current snapshot / 当前快照中已应用预备写
  snap_prepare: bool,
}

impl State {
  /// Already covered by what was received / 已被接收内容覆盖
  fn is_stale(&self, msg: &DcpResponse) -> bool {
    let last = self.last_seqno.get();
    match msg {
      DcpResponse::SnapshotMarker(m) => m.start < last && m.end <= last,
      _ => msg.by_seqno().is_some_and(|s| s <= last),
    }
  }
}

/// Outcome of one drain of the buffer / 一次排空缓冲区的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Drained {
  pub count: usize,
  pub bytes: usize,
  /// Messages remain buffered / 仍有缓冲消息
  pub more: bool,
}

pub struct PassiveStream {
  me: Weak<PassiveStream>,
  vb: Arc<dyn ReplicaVBucket>,
  throttle: Arc<dyn ReplicationThrottle>,
  conf: ParsedConf,
  opaque: u32,
  state: Mutex<State>,
  buffer: Mutex<Buffer>,
  /// One drainer at a time / 同一时刻只有一个排空者
  draining: Mutex<()>,
  ready: Mutex<VecDeque<ReadyMessage>>,
  /// Bytes consumed but not yet acked to the producer / 已消费但未向生产者确认的字节
  unacked: AtomicUsize,
}

impl PassiveStream {
  /// Create the stream and queue its stream request
  /// 创建流并排队流请求
  pub fn new(
    vb: Arc<dyn ReplicaVBucket>,
    throttle: Arc<dyn ReplicationThrottle>,
    opaque: u32,
    conf: &[Conf],
  ) -> Arc<Self> {
    let vbid = vb.vbid();
    let info = vb.checkpoint_manager().get_snapshot_info();
    info!(
      "{vbid} passive stream opaque {opaque} from seqno {} snapshot {}",
      info.start, info.range
    );
    let req = ReadyMessage::StreamRequest {
      vbid,
      opaque,
      start_seqno: info.start,
      snap_start: info.range.start,
      snap_end: info.range.end,
    };
    Arc::new_cyclic(|me| Self {
      me: me.clone(),
      vb,
      throttle,
      conf: ParsedConf::new(conf),
      opaque,
      state: Mutex::new(State {
        status: StreamState::Pending,
        last_seqno: Monotonic::new("last_received_seqno", info.start),
        snap: info.range,
        snap_type: SnapshotType::None,
        snap_prepare: false,
      }),
      buffer: Mutex::new(Buffer::default()),
      draining: Mutex::new(()),
      ready: Mutex::new(VecDeque::from([req])),
      unacked: AtomicUsize::new(0),
    })
  }

  #[inline]
  pub fn vbid(&self) -> Vbid {
    self.vb.vbid()
  }

  #[inline]
  pub fn opaque(&self) -> u32 {
    self.opaque
  }

  #[inline]
  pub fn batch_size(&self) -> usize {
    self.conf.batch_size
  }

  /// Producer answered the stream request / 生产者回复了流请求
  pub fn accept_stream(&self, status: Status, add_opaque: u32) {
    {
      let mut s = self.state.lock();
      if s.status != StreamState::Pending {
        warn!("{} accept_stream in state {}", self.vbid(), s.status);
        return;
      }
      s.status = if status.is_success() {
        StreamState::Reading
      } else {
        StreamState::Dead
      };
      info!("{} stream {} ({status})", self.vbid(), s.status);
    }
    self.push_ready(ReadyMessage::AddStreamResponse {
      opaque: add_opaque,
      stream_opaque: self.opaque,
      status,
    });
    if status.is_success() {
      self.vb.set_seqno_ack_sink(Some(self.ack_sink()));
    }
  }

  /// Receive one message: apply now, buffer it, or reject it
  /// 接收一条消息：立即应用、缓冲或拒绝
  ///
  /// `TempFail` means buffered; the caller must not advance its read cursor.
  /// `TempFail` 表示已缓冲，调用方不得前移读取位置。
  pub fn message_received(&self, msg: DcpResponse) -> Result<Status> {
    let size = msg.message_size();
    {
      let s = self.state.lock();
      if s.status == StreamState::Dead {
        debug!("{} dead stream drops {}", self.vbid(), msg.name());
        return Ok(Status::Success);
      }
      if s.is_stale(&msg) {
        warn!(
          "{} {} {:?} out of range, last received {}",
          self.vbid(),
          msg.name(),
          msg.by_seqno(),
          s.last_seqno.get()
        );
        return Ok(Status::OutOfRange);
      }
    }

    match self.throttle.status() {
      ThrottleStatus::Disconnect => {
        warn!("{} throttle asks to disconnect", self.vbid());
        return Ok(Status::Disconnect);
      }
      ThrottleStatus::Process if !self.conf.always_buffer => {
        let empty = self.buffer.lock().is_empty();
        if empty {
          let status = self.process_message(&msg)?;
          if !status.is_retryable() {
            self.unacked.fetch_add(size, Ordering::AcqRel);
            return Ok(status);
          }
          debug!("{} {} deferred: {status}", self.vbid(), msg.name());
        }
      }
      _ => {}
    }

    let mut buf = self.buffer.lock();
    // State may have changed while the lock was free
    if self.state.lock().status == StreamState::Dead {
      return Ok(Status::Success);
    }
    buf.push(msg, size);
    Ok(Status::TempFail)
  }

  /// Apply up to `batch` buffered messages in order
  /// 按序应用至多 `batch` 条缓冲消息
  ///
  /// A retryable failure leaves the message at the front and stops.
  /// 可重试失败时消息留在队首并停止。
  pub fn process_buffered_messages(&self, batch: usize) -> Result<Drained> {
    let _guard = self.draining.lock();
    let mut out = Drained::default();
    while out.count < batch {
      if self.state.lock().status == StreamState::Dead {
        break;
      }
      let Some((msg, _)) = self.buffer.lock().front() else {
        break;
      };
      let status = self.process_message(&msg)?;
      if status.is_retryable() {
        debug!("{} drain stops at {}: {status}", self.vbid(), msg.name());
        break;
      }
      if let Some(size) = self.buffer.lock().pop_front() {
        out.bytes += size;
      }
      out.count += 1;
    }
    self.unacked.fetch_add(out.bytes, Ordering::AcqRel);
    out.more = !self.buffer.lock().is_empty();
    Ok(out)
  }

  /// Take the bytes to ack to the producer / 取走需向生产者确认的字节数
  #[inline]
  pub fn move_flow_control_bytes(&self) -> usize {
    self.unacked.swap(0, Ordering::AcqRel)
  }

  /// Tear down; returns the buffered bytes dropped
  /// 拆除流；返回被丢弃的缓冲字节数
  pub fn set_dead(&self, reason: EndReason) -> usize {
    let mut buf = self.buffer.lock();
    let mut s = self.state.lock();
    if s.status == StreamState::Dead {
      return 0;
    }
    s.status = StreamState::Dead;
    let bytes = buf.clear();
    drop(s);
    drop(buf);
    self.unacked.fetch_add(bytes, Ordering::AcqRel);
    info!("{} stream dead ({reason:?}), dropped {bytes} buffered bytes", self.vbid());
    bytes
  }

  /// Pop the next outbound reply / 弹出下一条出站回复
  #[inline]
  pub fn next(&self) -> Option<ReadyMessage> {
    self.ready.lock().pop_front()
  }

  #[inline]
  pub fn ready_len(&self) -> usize {
    self.ready.lock().len()
  }

  fn push_ready(&self, msg: ReadyMessage) {
    self.ready.lock().push_back(msg);
  }

  /// Sink routing replica seqno acks into this stream's replies
  /// 将副本序列号确认路由到本流回复中的接收器
  pub fn ack_sink(&self) -> Arc<dyn SeqnoAckSink> {
    Arc::new(AckForwarder(self.me.clone()))
  }

  #[inline]
  pub fn state(&self) -> StreamState {
    self.state.lock().status
  }

  #[inline]
  pub fn last_received_seqno(&self) -> Seqno {
    self.state.lock().last_seqno.get()
  }

  pub fn cur_snapshot(&self) -> (SnapshotRange, SnapshotType) {
    let s = self.state.lock();
    (s.snap, s.snap_type)
  }

  #[inline]
  pub fn buffer_len(&self) -> usize {
    self.buffer.lock().len()
  }

  #[inline]
  pub fn buffer_bytes(&self) -> usize {
    self.buffer.lock().bytes()
  }
}

struct AckForwarder(Weak<PassiveStream>);

impl SeqnoAckSink for AckForwarder {
  fn seqno_ack(&self, vbid: Vbid, prepared_seqno: Seqno) {
    let Some(stream) = self.0.upgrade() else {
      return;
    };
    if stream.state() == StreamState::Dead {
      return;
    }
    debug!("{vbid} seqno ack {prepared_seqno}");
    stream.push_ready(ReadyMessage::SeqnoAck {
      vbid,
      prepared_seqno,
    });
  }
}
