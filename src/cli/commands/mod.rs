//! CLI command implementations

pub mod analyze;
pub mod bench;
pub mod check;
pub mod config;
pub mod run;

pub use analyze::execute as analyze;
pub use bench::execute as bench;
pub use check::execute as check;
pub use config::execute as config;
pub use run::execute as run;
