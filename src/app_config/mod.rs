pub mod db;
pub mod env;
pub mod log;
pub mod settle;
