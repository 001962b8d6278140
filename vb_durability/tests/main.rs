use std::sync::{Arc, Mutex};

use aok::{OK, Void};
use coarsetime::{Duration, Instant};
use log::info;
use vb_base::{Cookie, DocKey, Item, Level, QueuedItem, Requirements, Seqno, Status, Timeout, Vbid};
use vb_durability::{
  ActiveDurabilityMonitor, Error, Outstanding, PassiveDurabilityMonitor, Resolution,
  SeqnoAckSink, SyncWriteResolver,
};

#[static_init::constructor(0)]
extern "C" fn _log_init() {
  log_init::init();
}

/// Records applied resolutions / 记录已应用的裁决
#[derive(Default)]
struct Recorder {
  fail: bool,
  done: Mutex<Vec<(Resolution, Seqno, Option<Cookie>)>>,
}

impl Recorder {
  fn seqnos(&self, r: Resolution) -> Vec<Seqno> {
    self
      .done
      .lock()
      .unwrap()
      .iter()
      .filter(|d| d.0 == r)
      .map(|d| d.1)
      .collect()
  }
}

impl SyncWriteResolver for Recorder {
  fn commit(&self, _key: &DocKey, seqno: Seqno, cookie: Option<Cookie>) -> Status {
    if self.fail {
      return Status::KeyNotFound;
    }
    self.done.lock().unwrap().push((Resolution::Commit, seqno, cookie));
    Status::Success
  }

  fn abort(&self, _key: &DocKey, seqno: Seqno, cookie: Option<Cookie>) -> Status {
    self.done.lock().unwrap().push((Resolution::Abort, seqno, cookie));
    Status::Success
  }
}

#[derive(Default)]
struct Acks(Mutex<Vec<Seqno>>);

impl SeqnoAckSink for Acks {
  fn seqno_ack(&self, _vbid: Vbid, prepared_seqno: Seqno) {
    self.0.lock().unwrap().push(prepared_seqno);
  }
}

fn prepare(key: &str, seqno: Seqno, level: Level, timeout: Timeout) -> QueuedItem {
  Item::pending(key, "v", Requirements::new(level, timeout))
    .with_seqno(seqno)
    .into_queued()
}

fn majority(key: &str, seqno: Seqno) -> QueuedItem {
  prepare(key, seqno, Level::Majority, Timeout::Millis(1000))
}

fn adm(topology: &str) -> aok::Result<ActiveDurabilityMonitor> {
  let m = ActiveDurabilityMonitor::new(Vbid(0), &[]);
  m.set_replication_topology(topology)?;
  Ok(m)
}

const THREE: &str = r#"[["active","r1","r2"]]"#;

#[test]
fn test_majority_threshold() -> Void {
  let m = adm(THREE)?;
  assert_eq!(m.first_chain_majority(), Some(2));
  m.add_sync_write(Some(Cookie(1)), majority("k", 1))?;
  assert_eq!(m.num_tracked(), 1);
  assert_eq!(m.high_prepared_seqno(), 1);
  assert_eq!(m.resolved_queue_len(), 0);

  m.seqno_ack_received("r1", 1)?;
  assert_eq!(m.num_tracked(), 0);
  assert_eq!(m.resolved_queue_len(), 1);

  let r = Recorder::default();
  assert_eq!(m.process_completed_sync_write_queue(&r)?, 1);
  assert_eq!(r.seqnos(Resolution::Commit), vec![1]);
  assert_eq!(r.done.lock().unwrap()[0].2, Some(Cookie(1)));
  assert_eq!(m.last_committed_seqno(), 1);
  assert_eq!(m.high_completed_seqno(), 1);
  assert_eq!(m.node_write_seqno("r1"), Some(1));
  assert_eq!(m.node_ack_seqno("r1"), Some(1));
  OK
}

#[test]
fn test_ack_covers_earlier_writes() -> Void {
  let m = adm(THREE)?;
  for s in 1..=3 {
    m.add_sync_write(None, majority(&format!("k{s}"), s))?;
  }
  m.seqno_ack_received("r2", 2)?;
  assert_eq!(m.tracked_seqnos(), vec![3]);
  m.seqno_ack_received("r2", 1)?;
  assert_eq!(m.tracked_seqnos(), vec![3]);
  m.seqno_ack_received("r1", 3)?;
  let r = Recorder::default();
  m.process_completed_sync_write_queue(&r)?;
  assert_eq!(r.seqnos(Resolution::Commit), vec![1, 2, 3]);
  OK
}

#[test]
fn test_persist_on_master_waits_for_flush() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(
    None,
    prepare("k", 1, Level::MajorityAndPersistOnMaster, Timeout::Default),
  )?;
  m.add_sync_write(None, majority("j", 2))?;
  assert_eq!(m.high_prepared_seqno(), 0);

  m.seqno_ack_received("r1", 2)?;
  assert_eq!(m.num_tracked(), 2);

  m.notify_local_persistence(1)?;
  assert_eq!(m.high_prepared_seqno(), 2);
  assert_eq!(m.num_tracked(), 0);
  assert_eq!(m.resolved_queue_len(), 2);
  OK
}

#[test]
fn test_impossible_topology_aborts_every_finite_write() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(None, majority("a", 1))?;
  m.add_sync_write(None, majority("b", 2))?;
  m.add_sync_write(None, prepare("c", 3, Level::Majority, Timeout::Infinite))?;
  m.add_sync_write(None, majority("d", 4))?;

  m.set_replication_topology(r#"[["active",null,null]]"#)?;
  assert!(!m.is_durability_possible());
  assert_eq!(m.tracked_seqnos(), vec![3]);

  let r = Recorder::default();
  assert_eq!(m.process_completed_sync_write_queue(&r)?, 3);
  assert_eq!(r.seqnos(Resolution::Abort), vec![1, 2, 4]);
  assert_eq!(m.last_aborted_seqno(), 4);
  assert_eq!(m.high_completed_seqno(), 4);

  let err = m.add_sync_write(None, majority("e", 5)).unwrap_err();
  assert!(matches!(err, Error::DurabilityImpossible { seqno: 5, .. }));

  m.set_replication_topology(THREE)?;
  m.seqno_ack_received("r1", 3)?;
  assert_eq!(m.process_completed_sync_write_queue(&r)?, 1);
  assert_eq!(r.seqnos(Resolution::Commit), vec![3]);
  assert_eq!(m.last_committed_seqno(), 3);
  OK
}

/// Monitor holding an inherited prepare with no deadline at seqno 1
/// 在序列号 1 持有继承而来、无截止时间的预备写的监视器
fn with_inherited_prepare() -> aok::Result<ActiveDurabilityMonitor> {
  let o = Outstanding {
    hps: 0,
    hcs: 0,
    prepares: vec![majority("a", 1)],
  };
  let m = ActiveDurabilityMonitor::from_outstanding(Vbid(0), &[], o, 0)?;
  m.set_replication_topology(THREE)?;
  m.add_sync_write(None, prepare("b", 2, Level::Majority, Timeout::Millis(10)))?;
  Ok(m)
}

#[test]
fn test_finite_write_behind_inherited_aborts_on_impossible() -> Void {
  let m = with_inherited_prepare()?;
  m.set_replication_topology(r#"[["active",null,null]]"#)?;
  assert_eq!(m.tracked_seqnos(), vec![1]);
  let r = Recorder::default();
  assert_eq!(m.process_completed_sync_write_queue(&r)?, 1);
  assert_eq!(r.seqnos(Resolution::Abort), vec![2]);
  OK
}

#[test]
fn test_finite_write_behind_inherited_times_out() -> Void {
  let m = with_inherited_prepare()?;
  m.process_timeout(Instant::now() + Duration::from_millis(3_600_000))?;
  assert_eq!(m.tracked_seqnos(), vec![1]);

  // The older write still commits after the newer one was aborted
  m.seqno_ack_received("r1", 2)?;
  assert_eq!(m.num_tracked(), 0);
  let r = Recorder::default();
  assert_eq!(m.process_completed_sync_write_queue(&r)?, 2);
  assert_eq!(r.seqnos(Resolution::Abort), vec![2]);
  assert_eq!(r.seqnos(Resolution::Commit), vec![1]);
  assert_eq!(m.high_completed_seqno(), 2);
  OK
}

#[test]
fn test_timeout_skips_unexpired_front() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(None, prepare("a", 1, Level::Majority, Timeout::Millis(60_000)))?;
  m.add_sync_write(None, prepare("b", 2, Level::Majority, Timeout::Millis(10)))?;
  m.process_timeout(Instant::now() + Duration::from_millis(1000))?;
  assert_eq!(m.tracked_seqnos(), vec![1]);
  OK
}

#[test]
fn test_single_node_chain_commits_alone() -> Void {
  let m = adm(r#"[["active"]]"#)?;
  m.add_sync_write(None, majority("k", 1))?;
  assert_eq!(m.num_tracked(), 0);
  assert_eq!(m.resolved_queue_len(), 1);
  OK
}

#[test]
fn test_timeout_aborts_expired() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(None, prepare("a", 1, Level::Majority, Timeout::Millis(10)))?;
  m.add_sync_write(None, prepare("b", 2, Level::Majority, Timeout::Millis(60_000)))?;
  m.process_timeout(Instant::now() + Duration::from_millis(1000))?;
  assert_eq!(m.tracked_seqnos(), vec![2]);

  let r = Recorder::default();
  m.process_completed_sync_write_queue(&r)?;
  assert_eq!(r.seqnos(Resolution::Abort), vec![1]);
  OK
}

#[test]
fn test_default_timeout_from_conf() -> Void {
  let m = ActiveDurabilityMonitor::new(Vbid(0), &[vb_durability::Conf::DefaultTimeout(5)]);
  m.set_replication_topology(THREE)?;
  m.add_sync_write(None, prepare("a", 1, Level::Majority, Timeout::Default))?;
  m.process_timeout(Instant::now() + Duration::from_millis(500))?;
  assert_eq!(m.num_tracked(), 0);
  OK
}

#[test]
fn test_queued_ack_applied_on_topology() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(None, majority("k", 1))?;
  m.seqno_ack_received("r3", 1)?;
  assert_eq!(m.num_tracked(), 1);

  m.set_replication_topology(r#"[["active","r1","r3"]]"#)?;
  assert_eq!(m.num_tracked(), 0);
  assert_eq!(m.resolved_queue_len(), 1);
  OK
}

#[test]
fn test_second_chain_needs_its_own_majority() -> Void {
  let m = adm(r#"[["active","r1"],["active","r2"]]"#)?;
  m.add_sync_write(None, majority("k", 1))?;
  m.seqno_ack_received("r1", 1)?;
  assert_eq!(m.num_tracked(), 1);
  m.seqno_ack_received("r2", 1)?;
  assert_eq!(m.num_tracked(), 0);
  OK
}

#[test]
fn test_ack_from_active_is_error() -> Void {
  let m = adm(THREE)?;
  let err = m.seqno_ack_received("active", 1).unwrap_err();
  assert!(matches!(err, Error::AckFromActive { .. }));
  OK
}

#[test]
fn test_topology_validation() -> Void {
  let m = ActiveDurabilityMonitor::new(Vbid(0), &[]);
  let cases = [
    ("nope", "json"),
    ("[]", "count"),
    (r#"[["a"],["b"],["c"]]"#, "count"),
    ("[[]]", "empty"),
    (r#"[[null,"a"]]"#, "active"),
    (r#"[["a","a"]]"#, "dup"),
    (r#"[["a","b","c","d","e"]]"#, "large"),
  ];
  for (json, kind) in cases {
    let err = m.set_replication_topology(json).unwrap_err();
    info!("{json}: {err}");
    let ok = match kind {
      "json" => matches!(err, Error::TopologyJson(_)),
      "count" => matches!(err, Error::ChainCount(_)),
      "empty" => matches!(err, Error::ChainEmpty(_)),
      "active" => matches!(err, Error::ChainNoActive(_)),
      "dup" => matches!(err, Error::DuplicateNode { .. }),
      _ => matches!(err, Error::ChainTooLarge { len: 5, max: 4, .. }),
    };
    assert!(ok, "{json} -> {err}");
  }
  assert!(!m.has_topology());
  OK
}

#[test]
fn test_rejects_without_topology_or_durability() -> Void {
  let m = ActiveDurabilityMonitor::new(Vbid(3), &[]);
  assert!(matches!(
    m.add_sync_write(None, majority("k", 1)),
    Err(Error::NoTopology(Vbid(3)))
  ));
  let plain = Item::mutation("k", "v").with_seqno(1).into_queued();
  assert!(matches!(
    m.add_sync_write(None, plain),
    Err(Error::NotDurable { seqno: 1, .. })
  ));
  OK
}

#[test]
fn test_resolver_failure_is_fatal() -> Void {
  let m = adm(r#"[["active"]]"#)?;
  m.add_sync_write(None, majority("k", 1))?;
  let r = Recorder {
    fail: true,
    ..Default::default()
  };
  let err = m.process_completed_sync_write_queue(&r).unwrap_err();
  assert!(matches!(
    err,
    Error::ResolutionFailed {
      seqno: 1,
      status: Status::KeyNotFound,
      ..
    }
  ));
  OK
}

#[test]
fn test_cookies_taken_once() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(Some(Cookie(7)), majority("a", 1))?;
  m.add_sync_write(None, majority("b", 2))?;
  assert_eq!(m.get_cookies_for_in_flight_sync_writes(), vec![Cookie(7)]);
  assert!(m.get_cookies_for_in_flight_sync_writes().is_empty());
  OK
}

#[test]
fn test_stats() -> Void {
  let m = adm(THREE)?;
  m.add_sync_write(None, majority("a", 1))?;
  m.seqno_ack_received("r1", 1)?;
  let mut stats = Vec::new();
  m.add_stats(&mut |k, v| stats.push((k.to_owned(), v.to_owned())));
  let get = |k: &str| stats.iter().find(|s| s.0 == k).map(|s| s.1.clone());
  assert_eq!(get("vb_0:durability_monitor").as_deref(), Some("active"));
  assert_eq!(get("vb_0:num_accepted").as_deref(), Some("1"));
  assert_eq!(get("vb_0:resolved_queue_size").as_deref(), Some("1"));
  assert_eq!(
    get("vb_0:replication_chain_first:r1:last_ack_seqno").as_deref(),
    Some("1")
  );
  OK
}

#[test]
fn test_passive_memory_snapshot_fence() -> Void {
  let p = PassiveDurabilityMonitor::new(Vbid(1), 0, 0);
  let acks = Arc::new(Acks::default());
  p.set_ack_sink(Some(acks.clone()));

  p.add_sync_write(majority("a", 1))?;
  p.add_sync_write(prepare("b", 2, Level::PersistToMajority, Timeout::Default))?;
  p.add_sync_write(majority("c", 3))?;
  p.notify_snapshot_end_received(3, false)?;
  assert_eq!(p.high_prepared_seqno(), 1);
  assert_eq!(*acks.0.lock().unwrap(), vec![1]);

  p.notify_local_persistence(2)?;
  assert_eq!(p.high_prepared_seqno(), 3);
  p.notify_local_persistence(3)?;
  assert_eq!(*acks.0.lock().unwrap(), vec![1, 3]);

  p.complete_sync_write(&vb_base::doc_key("a"), Resolution::Commit, Some(1))?;
  assert_eq!(p.high_completed_seqno(), 1);
  assert_eq!(p.tracked_seqnos(), vec![2, 3]);

  p.complete_sync_write(&vb_base::doc_key("c"), Resolution::Abort, None)?;
  assert_eq!(p.high_completed_seqno(), 3);
  assert_eq!(p.tracked_seqnos(), vec![2, 3]);

  p.complete_sync_write(&vb_base::doc_key("b"), Resolution::Commit, Some(2))?;
  assert_eq!(p.num_tracked(), 0);
  OK
}

#[test]
fn test_passive_disk_snapshot_waits_for_persistence() -> Void {
  let p = PassiveDurabilityMonitor::new(Vbid(1), 0, 0);
  let acks = Arc::new(Acks::default());
  p.set_ack_sink(Some(acks.clone()));
  p.add_sync_write(majority("a", 1))?;
  p.add_sync_write(majority("b", 2))?;
  p.notify_snapshot_end_received(4, true)?;
  assert_eq!(p.high_prepared_seqno(), 0);
  assert!(acks.0.lock().unwrap().is_empty());

  p.notify_local_persistence(4)?;
  assert_eq!(p.high_prepared_seqno(), 2);
  assert_eq!(*acks.0.lock().unwrap(), vec![2]);
  OK
}

#[test]
fn test_passive_ack_sent_when_sink_attached() -> Void {
  let p = PassiveDurabilityMonitor::new(Vbid(1), 0, 0);
  p.add_sync_write(majority("a", 1))?;
  p.notify_snapshot_end_received(1, false)?;
  let acks = Arc::new(Acks::default());
  p.set_ack_sink(Some(acks.clone()));
  assert_eq!(*acks.0.lock().unwrap(), vec![1]);
  OK
}

#[test]
fn test_passive_errors() -> Void {
  let p = PassiveDurabilityMonitor::new(Vbid(2), 0, 0);
  p.add_sync_write(majority("a", 5))?;
  assert!(p.add_sync_write(majority("b", 4)).is_err());
  let plain = Item::mutation("k", "v").with_seqno(6).into_queued();
  assert!(matches!(
    p.add_sync_write(plain),
    Err(Error::NotDurable { .. })
  ));
  let err = p
    .complete_sync_write(&vb_base::doc_key("zz"), Resolution::Commit, None)
    .unwrap_err();
  assert!(matches!(err, Error::UnknownPrepare { seqno: None, .. }));
  let err = p
    .complete_sync_write(&vb_base::doc_key("a"), Resolution::Commit, Some(4))
    .unwrap_err();
  assert!(matches!(err, Error::UnknownPrepare { seqno: Some(4), .. }));
  OK
}

#[test]
fn test_handover_between_monitors() -> Void {
  let a = adm(THREE)?;
  a.add_sync_write(None, majority("a", 1))?;
  a.add_sync_write(None, majority("b", 2))?;

  let p = PassiveDurabilityMonitor::from_active(a);
  assert_eq!(p.tracked_seqnos(), vec![1, 2]);
  assert_eq!(p.high_prepared_seqno(), 2);
  p.add_sync_write(majority("c", 3))?;

  let a = ActiveDurabilityMonitor::from_passive(p, &[], 3)?;
  assert_eq!(a.tracked_seqnos(), vec![1, 2, 3]);
  a.process_timeout(Instant::now() + Duration::from_millis(3_600_000))?;
  assert_eq!(a.num_tracked(), 3);

  a.set_replication_topology(THREE)?;
  a.seqno_ack_received("r2", 3)?;
  let r = Recorder::default();
  assert_eq!(a.process_completed_sync_write_queue(&r)?, 3);
  assert_eq!(r.seqnos(Resolution::Commit), vec![1, 2, 3]);
  OK
}

#[test]
fn test_warmup_outstanding() -> Void {
  let o = Outstanding {
    hps: 4,
    hcs: 2,
    prepares: vec![majority("a", 3), majority("b", 4)],
  };
  let a = ActiveDurabilityMonitor::from_warmup(Vbid(0), &[], o)?;
  assert_eq!(a.high_prepared_seqno(), 4);
  assert_eq!(a.high_completed_seqno(), 2);
  a.set_replication_topology(r#"[["active"]]"#)?;
  assert_eq!(a.num_tracked(), 0);
  assert_eq!(a.resolved_queue_len(), 2);
  OK
}
