pub mod scope;
pub mod term;
