use super::{Dm, VBucket};

impl VBucket {
  /// Table, checkpoint and durability stats under `vb_N:` / `vb_N:` 前缀的统计
  pub fn add_stats(&self, add: &mut dyn FnMut(&str, &str)) {
    let p = format!("vb_{}:", self.vbid.0);
    let mut put = |k: &str, v: String| add(&format!("{p}{k}"), &v);
    put("num_items", self.ht.num_items().to_string());
    put("num_prepared", self.ht.num_prepared().to_string());
    put("flushed_seqno", self.persisted_seqno().to_string());
    put("max_cas", self.hlc.max_cas().to_string());

    self.cm.add_stats(add);
    match self.dm() {
      Dm::Active(adm) => adm.add_stats(add),
      Dm::Passive(pdm) => pdm.add_stats(add),
    }
  }
}
