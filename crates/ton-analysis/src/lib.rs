//! ton-analysis crate
//!
//! Post-bundling analytics: ordering and block placement of swap records,
//! frontrun/backrun candidate scans, and the statistics report.

pub mod detector;
pub mod ordering;
pub mod report;
pub mod stats;

pub use detector::{Detection, MevKind, MevPair, Scope};
pub use ordering::{build_index, OrderedSwap, SwapIndex};
pub use report::{build_report, AnalysisConfig, AnalysisReport};
