//! Flat key/value statistics / 扁平键值统计

use super::ActiveDurabilityMonitor;

impl ActiveDurabilityMonitor {
  /// Emit `vb_N:`-prefixed stats / 输出带 `vb_N:` 前缀的统计
  pub fn add_stats(&self, add: &mut dyn FnMut(&str, &str)) {
    let p = format!("vb_{}:", self.vbid.0);
    let s = self.state.read();
    let mut put = |k: &str, v: String| add(&format!("{p}{k}"), &v);

    put("durability_monitor", "active".to_owned());
    put("num_tracked", s.tracked.len().to_string());
    put("num_accepted", s.accepted.to_string());
    put("num_committed", s.committed.to_string());
    put("num_aborted", s.aborted.to_string());
    put("high_prepared_seqno", s.hps.get().to_string());
    put("high_completed_seqno", s.hcs.get().to_string());
    put("last_tracked_seqno", s.last_tracked.get().to_string());
    put("last_committed_seqno", s.last_committed.get().to_string());
    put("last_aborted_seqno", s.last_aborted.get().to_string());
    put("resolved_queue_size", self.resolved.len().to_string());
    put("persisted_seqno", s.persisted.to_string());

    for chain in s.first.iter().chain(s.second.iter()) {
      let c = format!("replication_chain_{}", chain.name());
      put(&format!("{c}:size"), chain.size().to_string());
      put(&format!("{c}:majority"), chain.majority().to_string());
      let mut nodes: Vec<_> = chain.positions().collect();
      nodes.sort_by(|a, b| a.0.as_str().cmp(b.0.as_str()));
      for (node, pos) in nodes {
        put(&format!("{c}:{node}:last_write_seqno"), pos.last_write_seqno.to_string());
        put(&format!("{c}:{node}:last_ack_seqno"), pos.last_ack_seqno.to_string());
      }
    }
  }
}
