//! Øyna - 水务AI系统工具集
//!
//! 核心设计原则：
//! - 模型文件是唯一事实来源，校验与清单都从 models/ 推导
//! - AI只负责转换和理解，不直接控制设备
//! - 所有外部系统在未配置时以模拟模式运行

pub mod cli;
pub mod core;
pub mod storage;

use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // 初始化日志（输出到 stderr，stdout 留给命令结果）
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("oyna=warn")))
        .init();

    let cli = cli::Cli::parse();
    tracing::info!("启动 Øyna: {:?}", cli.command);

    let code = cli::run(cli).await?;
    Ok(ExitCode::from(code))
}
