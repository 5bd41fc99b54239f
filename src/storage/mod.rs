//! 存储模块 - 配置文件与SQLite记录

pub mod config;
pub mod database;
