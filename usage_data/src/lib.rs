// Two kinds of report are understood:
//
// per-user GPU time, e.g. from `sreport` with the columns renamed:
//
//   USER    GPU-HOURS
//   alice   1234.5
//
// and per-node allocation as printed by
// `sinfo -N -o "%N %T %C %O %e/%m %G"`-like formats:
//
//   NODELIST  STATE  CPUS  CPU_LOAD  FREE_MEM/MEMORY  GRES
//   node1     idle   4/8   0.50      2048/4096MB      1/2
pub mod error;
pub mod gpu_usage;
pub mod misc {
    pub mod parsing;
}
pub mod node;

pub use error::ReadError;
pub use gpu_usage::{SlurmUser, UsageRow, UsageTable, UsageTableError};
pub use node::{NodeRow, NodeTable, Resource, SkipReason};
