pub mod engine;
pub mod merge_validator;
pub mod merger;
pub mod result;
pub mod step_coverage;
pub mod validator;
