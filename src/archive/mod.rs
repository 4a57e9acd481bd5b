//! Cache archive handling
//!
//! - `assemble`: split-part reassembly and list-only verification
//! - `extract`: extraction into the workspace and permission fixes

mod assemble;
mod extract;

pub use assemble::{ArchiveAssembler, ArchiveCheck};
pub use extract::{cache_stats, CacheExtractor, CacheStats};
