mod mock;

use std::{
  sync::{Arc, atomic::Ordering},
  thread,
};

use aok::{OK, Void};
use mock::{MockVb, mem, mutation, throttle};
use vb_base::{Item, Level, Requirements, Status, Timeout, VBucketState, Vbid, doc_key};
use vb_ckp::{CheckpointType, SnapshotRange};
use vb_dcp::{
  Conf, DcpResponse, EndReason, Error, PassiveStream, ReadyMessage, SnapshotMarker, SnapshotType,
  StreamState, marker_flag,
};
use vb_durability::SeqnoAckSink;

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

fn disk(start: u64, end: u64) -> SnapshotMarker {
  SnapshotMarker::new(start, end, marker_flag::DISK)
}

#[test]
fn test_stream_request_and_accept() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  assert_eq!(
    s.next(),
    Some(ReadyMessage::StreamRequest {
      vbid: Vbid(0),
      opaque: 1,
      start_seqno: 0,
      snap_start: 0,
      snap_end: 0,
    })
  );
  assert_eq!(s.state(), StreamState::Pending);

  s.accept_stream(Status::Success, 9);
  assert_eq!(s.state(), StreamState::Reading);
  assert_eq!(
    s.next(),
    Some(ReadyMessage::AddStreamResponse {
      opaque: 9,
      stream_opaque: 1,
      status: Status::Success,
    })
  );

  let sink = vb.sink.lock().unwrap().clone();
  let Some(sink) = sink else {
    panic!("ack sink not attached");
  };
  sink.seqno_ack(Vbid(0), 7);
  assert_eq!(
    s.next(),
    Some(ReadyMessage::SeqnoAck {
      vbid: Vbid(0),
      prepared_seqno: 7,
    })
  );
  OK
}

#[test]
fn test_rejected_accept_kills_stream() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.accept_stream(Status::KeyNotFound, 2);
  assert_eq!(s.state(), StreamState::Dead);
  assert!(vb.sink.lock().unwrap().is_none());
  OK
}

#[test]
fn test_memory_marker_extends_open_checkpoint() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);

  assert_eq!(s.message_received(mem(1, 5))?, Status::Success);
  for seqno in 1..=5 {
    assert_eq!(s.message_received(mutation(seqno))?, Status::Success);
  }
  let id = vb.cm.open_checkpoint_id();
  let n = vb.cm.num_checkpoints();

  assert_eq!(s.message_received(mem(6, 10))?, Status::Success);
  assert_eq!(vb.cm.open_checkpoint_id(), id);
  assert_eq!(vb.cm.num_checkpoints(), n);
  let (range, visible) = vb
    .cm
    .with_open_checkpoint(|c| (c.snapshot_range(), c.visible_snapshot_end()));
  assert_eq!(range, SnapshotRange::new(1, 10));
  assert_eq!(visible, 10);
  for seqno in 6..=10 {
    assert_eq!(s.message_received(mutation(seqno))?, Status::Success);
  }

  let chk = SnapshotMarker::new(11, 12, marker_flag::MEMORY | marker_flag::CHK);
  s.message_received(DcpResponse::SnapshotMarker(chk))?;
  assert_eq!(vb.cm.open_checkpoint_id(), id + 1);
  assert!(vb.ends.lock().unwrap().is_empty());
  OK
}

#[test]
fn test_ordering_rejection() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.message_received(mem(1, 5))?;
  assert_eq!(s.message_received(mutation(3))?, Status::Success);

  assert_eq!(s.message_received(mutation(3))?, Status::OutOfRange);
  assert_eq!(s.message_received(mutation(2))?, Status::OutOfRange);
  assert_eq!(s.last_received_seqno(), 3);
  // Beyond the snapshot end
  assert_eq!(s.message_received(mutation(7))?, Status::OutOfRange);
  assert_eq!(s.message_received(mem(1, 3))?, Status::OutOfRange);
  assert_eq!(s.message_received(mem(3, 8))?, Status::Success);
  assert_eq!(*vb.applied.lock().unwrap(), vec![3]);
  OK
}

#[test]
fn test_malformed_marker_rejected() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.accept_stream(Status::Success, 1);

  assert_eq!(s.message_received(mem(10, 5))?, Status::OutOfRange);
  assert_eq!(s.cur_snapshot().1, SnapshotType::None);

  assert_eq!(s.message_received(mem(1, 10))?, Status::Success);
  for seqno in 1..=5 {
    assert_eq!(s.message_received(mutation(seqno))?, Status::Success);
  }
  // Extending must not pull the end back
  assert_eq!(s.message_received(mem(6, 8))?, Status::OutOfRange);
  assert_eq!(s.message_received(mem(11, 8))?, Status::OutOfRange);
  assert_eq!(s.cur_snapshot(), (SnapshotRange::new(1, 10), SnapshotType::Memory));
  let range = vb.cm.with_open_checkpoint(|c| c.snapshot_range());
  assert_eq!(range, SnapshotRange::new(1, 10));

  for seqno in 6..=10 {
    assert_eq!(s.message_received(mutation(seqno))?, Status::Success);
  }
  OK
}

#[test]
fn test_pause_buffers_in_order() -> Void {
  let vb = MockVb::new();
  let (used, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);

  used.store(95, Ordering::Relaxed);
  let msgs = [mem(1, 5), mutation(1), mutation(2)];
  let total: usize = msgs.iter().map(DcpResponse::message_size).sum();
  assert_eq!(s.message_received(msgs[0].clone())?, Status::TempFail);
  assert_eq!(s.message_received(msgs[1].clone())?, Status::TempFail);
  used.store(0, Ordering::Relaxed);
  // Buffer not empty, so still deferred
  assert_eq!(s.message_received(msgs[2].clone())?, Status::TempFail);
  assert_eq!(s.buffer_len(), 3);
  assert_eq!(s.buffer_bytes(), total);
  assert!(vb.applied.lock().unwrap().is_empty());

  let d = s.process_buffered_messages(10)?;
  assert_eq!(d.count, 3);
  assert!(!d.more);
  assert_eq!(*vb.applied.lock().unwrap(), vec![1, 2]);
  assert_eq!(s.move_flow_control_bytes(), total);
  assert_eq!(s.move_flow_control_bytes(), 0);
  OK
}

#[test]
fn test_batch_limit() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[Conf::AlwaysBuffer(true), Conf::BatchSize(2)]);
  s.message_received(mem(1, 5))?;
  for seqno in 1..=3 {
    assert_eq!(s.message_received(mutation(seqno))?, Status::TempFail);
  }
  let d = s.process_buffered_messages(s.batch_size())?;
  assert_eq!((d.count, d.more), (2, true));
  let d = s.process_buffered_messages(s.batch_size())?;
  assert_eq!((d.count, d.more), (2, false));
  assert_eq!(*vb.applied.lock().unwrap(), vec![1, 2, 3]);
  OK
}

#[test]
fn test_retryable_failure_keeps_front() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.message_received(mem(1, 5))?;

  vb.fail
    .lock()
    .unwrap()
    .extend([Status::NoMemory, Status::TempFail]);
  assert_eq!(s.message_received(mutation(1))?, Status::TempFail);
  assert_eq!(s.message_received(mutation(2))?, Status::TempFail);

  let d = s.process_buffered_messages(10)?;
  assert_eq!((d.count, d.more), (0, true));
  assert_eq!(s.buffer_len(), 2);

  let d = s.process_buffered_messages(10)?;
  assert_eq!((d.count, d.more), (2, false));
  assert_eq!(*vb.applied.lock().unwrap(), vec![1, 2]);
  OK
}

#[test]
fn test_disconnect_throttle() -> Void {
  let vb = MockVb::new();
  let used = Arc::new(std::sync::atomic::AtomicUsize::new(100));
  let t = Arc::new(vb_dcp::MemoryThrottle::new(used, 100, 90).disconnect_when_full(true));
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  assert_eq!(s.message_received(mem(1, 5))?, Status::Disconnect);
  assert_eq!(s.buffer_len(), 0);
  OK
}

#[test]
fn test_dead_stream_drops_messages() -> Void {
  let vb = MockVb::new();
  let (used, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  used.store(99, Ordering::Relaxed);
  let size = mem(1, 5).message_size() + mutation(1).message_size();
  s.message_received(mem(1, 5))?;
  s.message_received(mutation(1))?;

  assert_eq!(s.set_dead(EndReason::Closed), size);
  assert_eq!(s.state(), StreamState::Dead);
  assert_eq!(s.set_dead(EndReason::Closed), 0);

  used.store(0, Ordering::Relaxed);
  assert_eq!(s.message_received(mutation(2))?, Status::Success);
  assert_eq!(s.buffer_len(), 0);
  assert_eq!(s.process_buffered_messages(10)?.count, 0);
  assert!(vb.applied.lock().unwrap().is_empty());
  assert_eq!(s.move_flow_control_bytes(), size);
  OK
}

#[test]
fn test_stream_end() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.accept_stream(Status::Success, 2);
  s.message_received(DcpResponse::StreamEnd(EndReason::Ok))?;
  assert!(s.is_dead());
  OK
}

#[test]
fn test_visible_beyond_end_is_fatal() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  let m = SnapshotMarker::new(1, 5, marker_flag::MEMORY).with_mvs(6);
  let err = s.message_received(DcpResponse::SnapshotMarker(m)).unwrap_err();
  assert!(matches!(err, Error::VisibleBeyondEnd { mvs: 6, end: 5, .. }));
  OK
}

#[test]
fn test_disk_marker_hcs() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t.clone(), 1, &[]);
  let st = s.message_received(DcpResponse::SnapshotMarker(disk(1, 5)))?;
  assert_eq!(st, Status::OutOfRange);

  let s = PassiveStream::new(vb.clone(), t, 2, &[Conf::SyncReplication(false)]);
  let st = s.message_received(DcpResponse::SnapshotMarker(disk(1, 5).with_hcs(4)))?;
  assert_eq!(st, Status::Success);
  assert_eq!(vb.cm.with_open_checkpoint(|c| c.high_completed_seqno()), Some(0));
  OK
}

#[test]
fn test_initial_disk_snapshot() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.message_received(DcpResponse::SnapshotMarker(disk(1, 3).with_hcs(0)))?;
  assert_eq!(vb.cm.open_checkpoint_type(), CheckpointType::InitialDisk);
  assert!(vb.initial_disk.load(Ordering::Acquire));

  for seqno in 1..=3 {
    s.message_received(mutation(seqno))?;
  }
  assert!(!vb.initial_disk.load(Ordering::Acquire));
  assert_eq!(*vb.ends.lock().unwrap(), vec![(3, true)]);

  s.message_received(DcpResponse::SnapshotMarker(disk(4, 6).with_hcs(0)))?;
  assert_eq!(vb.cm.open_checkpoint_type(), CheckpointType::Disk);
  OK
}

#[test]
fn test_prepare_snapshot_notifies_end() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.message_received(mem(1, 3))?;
  let reqs = Requirements::new(Level::Majority, Timeout::Infinite);
  s.message_received(DcpResponse::Prepare(Item::pending("p", "v", reqs).with_seqno(1)))?;
  s.message_received(mutation(2))?;
  assert!(vb.ends.lock().unwrap().is_empty());
  s.message_received(DcpResponse::Commit {
    key: doc_key("p"),
    prepare_seqno: 1,
    commit_seqno: 3,
  })?;
  assert_eq!(*vb.ends.lock().unwrap(), vec![(3, false)]);

  s.message_received(mem(4, 5))?;
  s.message_received(mutation(4))?;
  s.message_received(DcpResponse::SeqnoAdvanced(5))?;
  assert_eq!(vb.ends.lock().unwrap().len(), 1);
  assert_eq!(s.last_received_seqno(), 5);
  OK
}

#[test]
fn test_history_marker_keeps_snapshot_end() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t.clone(), 1, &[]);
  s.message_received(DcpResponse::SnapshotMarker(disk(1, 10).with_hcs(0)))?;
  for seqno in 1..=4 {
    s.message_received(mutation(seqno))?;
  }
  let hist = SnapshotMarker::new(5, 10, marker_flag::DISK | marker_flag::HISTORY).with_hcs(0);
  s.message_received(DcpResponse::SnapshotMarker(hist))?;
  assert_eq!(s.cur_snapshot(), (SnapshotRange::new(1, 10), SnapshotType::Disk));
  assert!(vb.cm.with_open_checkpoint(|c| c.history()));

  let vb = MockVb::new();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.message_received(DcpResponse::SnapshotMarker(disk(1, 10).with_hcs(0)))?;
  for seqno in 1..=4 {
    s.message_received(mutation(seqno))?;
  }
  s.message_received(DcpResponse::SnapshotMarker(disk(5, 10).with_hcs(0)))?;
  assert_eq!(s.cur_snapshot(), (SnapshotRange::new(5, 10), SnapshotType::Disk));
  OK
}

#[test]
fn test_replies() -> Void {
  let vb = MockVb::new();
  let (_, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 4, &[]);
  s.next();
  let m = SnapshotMarker::new(1, 2, marker_flag::MEMORY | marker_flag::ACK);
  s.message_received(DcpResponse::SnapshotMarker(m))?;
  s.message_received(DcpResponse::SetVBucketState(VBucketState::Pending))?;
  assert_eq!(*vb.state.lock().unwrap(), Some(VBucketState::Pending));
  assert_eq!(
    s.next(),
    Some(ReadyMessage::SnapshotMarkerResponse {
      opaque: 4,
      status: Status::Success,
    })
  );
  assert_eq!(
    s.next(),
    Some(ReadyMessage::SetVBucketStateResponse {
      opaque: 4,
      status: Status::Success,
    })
  );
  assert_eq!(s.next(), None);
  OK
}

#[test]
fn test_stats() -> Void {
  let vb = MockVb::new();
  let (used, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  s.accept_stream(Status::Success, 2);
  used.store(99, Ordering::Relaxed);
  s.message_received(mem(1, 5))?;
  let mut stats = Vec::new();
  s.add_stats(&mut |k, v| stats.push((k.to_owned(), v.to_owned())));
  let get = |k: &str| stats.iter().find(|s| s.0 == k).map(|s| s.1.clone());
  assert_eq!(get("vb_0:stream_state").as_deref(), Some("reading"));
  assert_eq!(get("vb_0:buffer_items").as_deref(), Some("1"));
  OK
}

#[test]
fn test_concurrent_receive_and_drain() -> Void {
  let vb = MockVb::new();
  let (used, t) = throttle();
  let s = PassiveStream::new(vb.clone(), t, 1, &[]);
  used.store(99, Ordering::Relaxed);
  const N: u64 = 200;

  thread::scope(|scope| {
    let s = &s;
    scope.spawn(move || {
      assert_eq!(s.message_received(mem(1, N)).ok(), Some(Status::TempFail));
      for seqno in 1..=N {
        assert_eq!(s.message_received(mutation(seqno)).ok(), Some(Status::TempFail));
      }
    });
    scope.spawn(move || {
      let mut done = 0;
      while done < N as usize + 1 {
        match s.process_buffered_messages(7) {
          Ok(d) => done += d.count,
          Err(e) => panic!("{e}"),
        }
        thread::yield_now();
      }
    });
  });

  let applied = vb.applied.lock().unwrap().clone();
  assert_eq!(applied, (1..=N).collect::<Vec<_>>());
  assert_eq!(s.last_received_seqno(), N);
  OK
}
