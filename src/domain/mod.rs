//! 领域模型模块

pub mod account;
pub mod keys;
