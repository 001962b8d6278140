//! In-flight prepares handed over between monitors
//! 监视器之间交接的进行中预备写

use vb_base::{QueuedItem, Seqno};

#[derive(Debug, Clone, Default)]
pub struct Outstanding {
  pub hps: Seqno,
  pub hcs: Seqno,
  /// Uncompleted prepares in seqno order / 按序列号排列的未完成预备写
  pub prepares: Vec<QueuedItem>,
}
