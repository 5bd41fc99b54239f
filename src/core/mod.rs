//! Core模块 - 包含所有核心业务逻辑

pub mod agent;
pub mod extractor;
pub mod knowledge;
pub mod llm;
pub mod manifest;
pub mod models;
pub mod scanner;
pub mod validator;
