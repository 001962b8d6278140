//! Flat key/value statistics / 扁平键值统计

use super::CheckpointManager;
use crate::Checkpoint;

impl CheckpointManager {
  /// Emit `vb_N:`-prefixed stats / 输出带 `vb_N:` 前缀的统计
  pub fn add_stats(&self, add: &mut dyn FnMut(&str, &str)) {
    let p = format!("vb_{}:", self.vbid.0);
    let inner = self.inner.lock();
    let mut put = |k: &str, v: String| add(&format!("{p}{k}"), &v);

    put("state", inner.vb_state.to_string());
    put("open_checkpoint_id", inner.open.id().to_string());
    put("num_checkpoints", inner.len().to_string());
    put(
      "num_checkpoint_items",
      inner.iter().map(Checkpoint::num_items).sum::<usize>().to_string(),
    );
    put("num_open_checkpoint_items", inner.open.num_items().to_string());
    put("last_seqno", inner.last_by_seqno.to_string());
    put("max_visible_seqno", inner.max_visible_seqno.to_string());
    put("mem_overhead", self.mem_overhead().to_string());
    put(
      "num_expelled_items",
      inner.iter().map(Checkpoint::num_expelled).sum::<usize>().to_string(),
    );
    put("num_cursors", inner.cursors.len().to_string());

    let mut cursors: Vec<_> = inner.cursors.values().collect();
    cursors.sort_by(|a, b| a.name().cmp(b.name()));
    for c in cursors {
      let name = c.name();
      put(&format!("{name}:cursor_checkpoint_id"), c.ckpt_id.to_string());
      put(&format!("{name}:cursor_seqno"), c.seqno.to_string());
      put(&format!("{name}:num_visits"), c.visits.to_string());
    }
  }
}
