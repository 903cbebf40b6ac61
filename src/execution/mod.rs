pub mod dependency;
pub mod priority;
pub mod scheduler;
