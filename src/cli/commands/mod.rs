pub mod analyze;
pub mod config;
pub mod report;
pub mod trace;
