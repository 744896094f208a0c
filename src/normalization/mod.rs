pub mod name;
pub mod platform;
