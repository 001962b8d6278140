//! Replication topology parsing and validation
//! 复制拓扑的解析与校验
//!
//! Format: `[["active", "replica" | null, ...], [...]?]`

use std::collections::HashSet;

use vb_base::NodeName;

use crate::{ChainName, Error, Result};

pub type ChainNodes = Vec<Option<NodeName>>;

/// Parse and validate; nothing is applied on error
/// 解析并校验；出错时不做任何变更
pub fn parse_topology(json: &str, max_replicas: usize) -> Result<Vec<ChainNodes>> {
  let raw: Vec<Vec<Option<String>>> = serde_json::from_str(json)?;
  if raw.is_empty() || raw.len() > 2 {
    return Err(Error::ChainCount(raw.len()));
  }

  let mut chains = Vec::with_capacity(raw.len());
  for (i, chain) in raw.into_iter().enumerate() {
    let name = if i == 0 {
      ChainName::First
    } else {
      ChainName::Second
    };
    if chain.is_empty() {
      return Err(Error::ChainEmpty(name));
    }
    if chain.len() > 1 + max_replicas {
      return Err(Error::ChainTooLarge {
        chain: name,
        len: chain.len(),
        max: 1 + max_replicas,
      });
    }
    if chain[0].is_none() {
      return Err(Error::ChainNoActive(name));
    }
    let mut seen = HashSet::new();
    let mut nodes = ChainNodes::with_capacity(chain.len());
    for node in chain {
      let node = node.map(NodeName::from);
      if let Some(n) = &node
        && !seen.insert(n.clone())
      {
        return Err(Error::DuplicateNode {
          chain: name,
          node: n.clone(),
        });
      }
      nodes.push(node);
    }
    chains.push(nodes);
  }
  Ok(chains)
}
