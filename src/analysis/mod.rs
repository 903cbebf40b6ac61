pub mod components;
pub mod duplicate;
pub mod matrix;
pub mod prefix;
pub mod role;
pub mod sequence;
pub mod similarity;
pub mod uniqueness;
pub mod website;
