pub mod igdb;
pub mod provider;
pub mod scheduler;
