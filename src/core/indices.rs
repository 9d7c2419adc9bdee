use hashbrown::HashMap;

use crate::types::TodoId;

/// Secondary index from a key to the ids carrying it, in insertion order.
pub type VecIndex<K> = HashMap<K, Vec<TodoId>>;
