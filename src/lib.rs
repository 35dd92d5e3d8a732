pub mod app_config;
pub mod error;
pub mod job;
pub mod settlement;
pub mod time_util;
