//! 支付结算与托管引擎
//!
//! domain 是领域模型，store 是台账，gateway 对接支付网关，
//! services 承载状态机与业务规则，api 是对外 HTTP 面

pub mod api;
pub mod domain;
pub mod gateway;
pub mod services;
pub mod store;
