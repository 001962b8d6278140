//! Striped document table with committed and prepared namespaces
//! 分段锁文档表，含已提交与预备两个命名空间

use std::{
  collections::HashMap,
  hash::{BuildHasher, RandomState},
};

use bytes::Bytes;
use parking_lot::{Mutex, MutexGuard};
use vb_base::{Cas, DocKey, Item, Requirements, Seqno};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
  pub value: Bytes,
  pub by_seqno: Seqno,
  pub cas: Cas,
  pub rev_seqno: u64,
  pub deleted: bool,
  /// Set on in-flight prepares / 进行中预备写设置
  pub durability: Option<Requirements>,
}

impl StoredValue {
  pub fn of(item: &Item) -> Self {
    Self {
      value: item.value.clone(),
      by_seqno: item.by_seqno,
      cas: item.cas,
      rev_seqno: item.rev_seqno,
      deleted: item.deleted,
      durability: item.durability,
    }
  }
}

#[derive(Debug, Default)]
pub struct Stripe {
  pub committed: HashMap<DocKey, StoredValue>,
  pub prepared: HashMap<DocKey, StoredValue>,
}

impl Stripe {
  /// Next revision for `key` / `key` 的下一个修订号
  pub fn next_rev(&self, key: &DocKey) -> u64 {
    self.committed.get(key).map_or(1, |v| v.rev_seqno + 1)
  }

  #[inline]
  pub fn is_live(&self, key: &DocKey) -> bool {
    self.committed.get(key).is_some_and(|v| !v.deleted)
  }
}

pub struct HashTable {
  stripes: Box<[Mutex<Stripe>]>,
  hasher: RandomState,
}

impl HashTable {
  pub fn new(stripes: usize) -> Self {
    Self {
      stripes: (0..stripes.max(1)).map(|_| Mutex::default()).collect(),
      hasher: RandomState::new(),
    }
  }

  /// Lock the stripe owning `key` / 锁定 `key` 所在分段
  pub fn lock(&self, key: &DocKey) -> MutexGuard<'_, Stripe> {
    let i = self.hasher.hash_one(key) as usize % self.stripes.len();
    self.stripes[i].lock()
  }

  /// Live committed documents / 存活的已提交文档数
  pub fn num_items(&self) -> usize {
    self
      .stripes
      .iter()
      .map(|s| s.lock().committed.values().filter(|v| !v.deleted).count())
      .sum()
  }

  pub fn num_prepared(&self) -> usize {
    self.stripes.iter().map(|s| s.lock().prepared.len()).sum()
  }
}
