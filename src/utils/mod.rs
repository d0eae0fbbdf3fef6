//! 工具模块

pub mod abi;
pub mod address;
pub mod units;
