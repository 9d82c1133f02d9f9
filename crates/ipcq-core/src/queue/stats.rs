//! QueueStats - キュー状態のスナップショット（JSON で出力できる）

use serde::{Deserialize, Serialize};

/// ある時点でのキューのカウンタ
///
/// `pending` はロック下で読み、カウンタは relaxed で読むので、
/// push 中に取ったスナップショットは多少ずれることがあります。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: usize,
    pub pushed: u64,
    pub executed: u64,
    pub closed: bool,
}
