// streamwatch-core/src/lib.rs

pub mod db;
pub mod platforms;
pub mod repositories;
pub mod services;
pub mod tasks;

pub use db::Database;
pub use streamwatch_common::Error;
