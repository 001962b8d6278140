use std::sync::atomic::Ordering;

use super::PassiveStream;

impl PassiveStream {
  pub fn add_stats(&self, add: &mut dyn FnMut(&str, &str)) {
    let p = format!("vb_{}:", self.vbid().0);
    let mut put = |k: &str, v: String| add(&format!("{p}{k}"), &v);
    {
      let s = self.state.lock();
      put("stream_state", s.status.to_string());
      put("last_received_seqno", s.last_seqno.get().to_string());
      put("cur_snapshot_start", s.snap.start.to_string());
      put("cur_snapshot_end", s.snap.end.to_string());
      put("cur_snapshot_type", format!("{:?}", s.snap_type));
    }
    {
      let b = self.buffer.lock();
      put("buffer_items", b.len().to_string());
      put("buffer_bytes", b.bytes().to_string());
    }
    put("ready_queue_size", self.ready_len().to_string());
    put("unacked_bytes", self.unacked.load(Ordering::Acquire).to_string());
  }
}
