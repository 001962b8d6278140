use aok::{OK, Void};
use proptest::prelude::*;
use vb_base::{
  Hlc, Item, Level, Monotonic, QueueOp, Requirements, Status, Timeout, VBucketState, Vbid,
  WeaklyMonotonic,
};

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

#[test]
fn test_queue_op_classes() -> Void {
  for op in [
    QueueOp::Empty,
    QueueOp::CheckpointStart,
    QueueOp::CheckpointEnd,
    QueueOp::SetVbucketState,
  ] {
    assert!(op.is_meta(), "{op}");
    assert!(!op.is_sync_write());
  }
  assert!(!QueueOp::SystemEvent.is_meta());
  assert!(QueueOp::PendingSyncWrite.is_prepared_namespace());
  assert!(QueueOp::AbortSyncWrite.is_prepared_namespace());
  assert!(!QueueOp::CommitSyncWrite.is_prepared_namespace());
  assert!(QueueOp::CommitSyncWrite.is_visible());
  assert!(!QueueOp::PendingSyncWrite.is_visible());
  OK
}

#[test]
fn test_item_ctor() -> Void {
  let reqs = Requirements::new(Level::PersistToMajority, Timeout::Millis(100));
  let p = Item::pending("k", "v", reqs).with_seqno(7);
  assert_eq!(p.op, QueueOp::PendingSyncWrite);
  assert!(!p.is_committed());
  assert_eq!(p.durability, Some(reqs));
  assert_eq!(&p.key[..], b"k");

  let c = Item::commit(p.key.clone(), p.value.clone(), 7);
  assert!(c.is_committed());
  assert_eq!(c.prepare_seqno, 7);

  let d = Item::deletion("k");
  assert!(d.deleted);
  assert!(d.size() > 0);

  let s = Item::set_vbucket_state(VBucketState::Active, 3);
  assert!(s.is_meta());
  assert_eq!(s.vb_state, Some(VBucketState::Active));
  OK
}

#[test]
fn test_level() -> Void {
  assert!(!Level::Majority.persist_on_active());
  assert!(Level::MajorityAndPersistOnMaster.persist_on_active());
  assert!(!Level::MajorityAndPersistOnMaster.persist_on_replica());
  assert!(Level::PersistToMajority.persist_on_replica());
  assert!(!Requirements::default().is_durable());
  OK
}

#[test]
fn test_monotonic() -> Void {
  let mut m = Monotonic::new("m", 0);
  m.set(1)?;
  assert!(m.set(1).is_err());
  assert!(m.set(0).is_err());
  assert_eq!(m.get(), 1);

  let mut w = WeaklyMonotonic::new("w", 5);
  w.set(5)?;
  assert!(w.set(4).is_err());
  assert!(!w.advance(3));
  assert!(w.advance(9));
  assert_eq!(w.get(), 9);
  OK
}

#[test]
fn test_status() -> Void {
  assert!(Status::TempFail.is_retryable());
  assert!(Status::NoMemory.is_retryable());
  assert!(!Status::OutOfRange.is_retryable());
  assert_eq!(Vbid(3).to_string(), "vb:3");
  OK
}

#[test]
fn test_hlc_threads() -> Void {
  let hlc = Hlc::new();
  let mut all: Vec<u64> = std::thread::scope(|s| {
    let hs: Vec<_> = (0..4)
      .map(|_| s.spawn(|| (0..1000).map(|_| hlc.next_cas()).collect::<Vec<_>>()))
      .collect();
    hs.into_iter().flat_map(|h| h.join().unwrap()).collect()
  });
  let n = all.len();
  all.sort_unstable();
  all.dedup();
  assert_eq!(all.len(), n, "cas values must be unique");
  OK
}

proptest! {
  #[test]
  fn prop_weak_monotonic_never_decreases(vals in prop::collection::vec(0..100u64, 0..50)) {
    let mut w = WeaklyMonotonic::new("w", 0);
    let mut last = 0;
    for v in vals {
      let ok = w.set(v).is_ok();
      prop_assert_eq!(ok, v >= last);
      if ok {
        last = v;
      }
      prop_assert_eq!(w.get(), last);
    }
  }
}
