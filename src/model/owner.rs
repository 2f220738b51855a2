use serde::{Deserialize, Serialize};

/// The single-row lease held by the current owning process. See
/// `store::ownership::OwnershipArbiter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRow {
    pub pid: u32,
    pub heartbeat_at_ms: i64,
}
