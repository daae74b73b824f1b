//! The digital thread engine: typed links between lifecycle artifacts and the
//! analyses that run over them.

pub mod autolink;
pub mod coverage;
pub mod external;
pub mod gaps;
pub mod integrity;
pub mod links;
pub mod orphans;
pub mod report;
pub mod resolver;
pub mod trace;
pub mod types;
