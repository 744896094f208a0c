pub mod api;
pub mod catalog;
pub mod enrichment;
pub mod normalization;
pub mod tracing;

pub mod util {
    pub mod env;
}

pub use catalog::db::Db;
