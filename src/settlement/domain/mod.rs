//! 结算领域模型

pub mod entities;
pub mod money;
pub mod percentage;
pub mod rate;
pub mod status;
