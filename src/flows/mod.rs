pub mod classifier;
pub mod coverage;
pub mod flow_analyzer;
pub mod flow_model;
pub mod graph;
