pub mod loader;
pub mod normalize;
pub mod test_case;
pub mod validate;
