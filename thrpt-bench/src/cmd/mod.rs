pub mod drill;
pub mod pace;
