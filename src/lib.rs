pub mod analysis;
pub mod cli;
pub mod error;
pub mod execution;
pub mod flows;
pub mod model;
pub mod optimization;
pub mod oracle;
pub mod report;
pub mod trace;
