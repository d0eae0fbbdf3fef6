//! 服务层模块

pub mod account_service;
pub mod exchange_service;
pub mod rpc_client;
pub mod transaction_builder;
