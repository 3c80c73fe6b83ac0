pub mod reconcile;
pub mod stats;

pub use reconcile::{CycleOutcome, CycleResult, QualifyFilter, ReconciliationEngine};
pub use stats::{DashboardStats, StatsService};
