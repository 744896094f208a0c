pub mod db;
pub mod index;
pub mod models;
pub mod reconcile;
pub mod search;
pub mod views;
