//! 命令行入口
//!
//! 每个子命令对应 tools/ 下的一个工具或代理问答。

use crate::core::agent::OynaAgent;
use crate::core::knowledge::{KnowledgeConverter, KnowledgePipeline};
use crate::core::llm::LlmClient;
use crate::core::manifest::{build_manifest, write_manifest};
use crate::core::models::AppConfig;
use crate::core::validator::run_validation;
use crate::storage::config::ConfigManager;
use crate::storage::database::Database;
use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "oyna", version, about = "Øyna AI system: model validation, manifest, knowledge and agent")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file (default: platform config dir)")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate models/v1 JSON files against models/schemas
    Validate {
        #[arg(long, help = "Project root containing models/")]
        project_root: Option<PathBuf>,
        #[arg(long, help = "Pretty-print validation errors with bullets")]
        pretty: bool,
    },
    /// Generate a consolidated manifest.json from model files
    Manifest {
        #[arg(long, help = "Directory containing model JSON files (default: <root>/models)")]
        models_dir: Option<PathBuf>,
        #[arg(long, help = "Output manifest file (default: <root>/manifest.json)")]
        output: Option<PathBuf>,
        #[arg(long, help = "Pretty-print JSON with indentation")]
        pretty: bool,
    },
    /// Convert raw documents into structured knowledge JSON
    Knowledge {
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        #[arg(long)]
        processed_dir: Option<PathBuf>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, help = "LLM model name")]
        model: Option<String>,
        #[arg(long, help = "LLM endpoint (OpenAI-compatible base URL or Ollama host)")]
        endpoint: Option<String>,
    },
    /// Ask the agent a question
    Ask {
        query: String,
        #[arg(long, help = "Master manifest path")]
        manifest: Option<PathBuf>,
        #[arg(long, help = "Do not record the episode")]
        no_record: bool,
    },
    /// Show recorded agent episodes or knowledge ingestions
    History {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, help = "Show knowledge ingestions instead of agent episodes")]
        ingestions: bool,
    },
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective configuration
    Show,
    /// Write a default config file if none exists
    Init,
    /// Overwrite the config file with defaults
    Reset,
}

/// 相对路径按项目根目录解析
fn resolve(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn open_database(config: &AppConfig) -> Result<Database> {
    let path = config
        .database_path
        .clone()
        .unwrap_or_else(Database::default_path);
    Database::open(&path)
}

/// 执行命令，返回进程退出码
pub async fn run(cli: Cli) -> Result<u8> {
    let manager = ConfigManager::new(cli.config.clone().unwrap_or_else(ConfigManager::default_path));

    // 配置只在需要时加载，损坏的配置文件仍可以 init/reset
    match cli.command {
        Commands::Validate {
            project_root,
            pretty,
        } => {
            let config = manager.load()?;
            let root = project_root.unwrap_or_else(|| config.project_root.clone());
            let summary = run_validation(&root);
            print!("{}", summary.render(pretty));
            Ok(if summary.is_all_valid() { 0 } else { 1 })
        }
        Commands::Manifest {
            models_dir,
            output,
            pretty,
        } => {
            let root = manager.load()?.project_root;
            let models_dir = models_dir.unwrap_or_else(|| root.join("models"));
            let output = output.unwrap_or_else(|| root.join("manifest.json"));

            let manifest = build_manifest(&models_dir, &root);
            write_manifest(&manifest, &output, pretty)?;

            println!("[INFO] Manifest written to: {}", output.display());
            println!("[INFO] Total models in manifest: {}", manifest.model_count);
            Ok(0)
        }
        Commands::Knowledge {
            raw_dir,
            processed_dir,
            out_dir,
            model,
            endpoint,
        } => {
            let mut config = manager.load()?;
            if let Some(dir) = raw_dir {
                config.knowledge.raw_dir = dir;
            }
            if let Some(dir) = processed_dir {
                config.knowledge.processed_dir = dir;
            }
            if let Some(dir) = out_dir {
                config.knowledge.out_dir = dir;
            }
            if let Some(model) = model {
                config.llm.model_name = model;
            }
            if let Some(endpoint) = endpoint {
                config.llm.api_endpoint = endpoint;
            }

            let llm = LlmClient::new(config.llm.clone())?;
            let pipeline = KnowledgePipeline::new(KnowledgeConverter::new(llm), config.knowledge.clone());
            let report = pipeline.run().await?;

            for record in &report.records {
                match (&record.knowledge_file, &record.error) {
                    (Some(out), _) => println!("{} -> {}", record.source_file.display(), out.display()),
                    (None, Some(err)) => println!("{} FAILED: {}", record.source_file.display(), err),
                    (None, None) => println!("{} skipped", record.source_file.display()),
                }
            }
            println!("{}", report.summary());

            if !report.records.is_empty() {
                match open_database(&config) {
                    Ok(db) => {
                        for record in &report.records {
                            if let Err(e) = db.save_ingestion(record) {
                                tracing::warn!("保存入库记录失败: {:#}", e);
                            }
                        }
                    }
                    Err(e) => tracing::warn!("无法打开数据库: {:#}", e),
                }
            }
            Ok(0)
        }
        Commands::Ask {
            query,
            manifest,
            no_record,
        } => {
            let config = manager.load()?;
            let manifest_path = manifest
                .unwrap_or_else(|| resolve(&config.project_root, &config.agent.manifest_path));
            let mut agent = OynaAgent::new(&manifest_path, &config.agent)?;

            if config.agent.record_episodes && !no_record {
                match open_database(&config) {
                    Ok(db) => agent = agent.with_episode_store(db),
                    Err(e) => tracing::warn!("无法打开数据库，不记录会话: {:#}", e),
                }
            }

            let outcome = agent.ask(&query).await?;
            println!("{}", outcome);
            Ok(0)
        }
        Commands::History { limit, ingestions } => {
            let db = open_database(&manager.load()?)?;
            if ingestions {
                for record in db.load_recent_ingestions(limit)? {
                    println!(
                        "{}  {:?}  {}",
                        record.processed_at.format("%Y-%m-%d %H:%M:%S"),
                        record.status,
                        record.source_file.display()
                    );
                }
            } else {
                for episode in db.load_recent_episodes(limit)? {
                    println!(
                        "{}  {}\n    {}",
                        episode.asked_at.format("%Y-%m-%d %H:%M:%S"),
                        episode.query,
                        episode.result
                    );
                }
            }
            Ok(0)
        }
        Commands::Config { command } => {
            match command {
                ConfigCommands::Show => {
                    let config = manager.load()?;
                    println!("# {}", manager.path().display());
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
                ConfigCommands::Init => {
                    if manager.path().exists() {
                        println!("Config already exists: {}", manager.path().display());
                    } else {
                        manager.save(&AppConfig::default())?;
                        println!("Wrote default config: {}", manager.path().display());
                    }
                }
                ConfigCommands::Reset => {
                    manager.reset()?;
                    println!("Config reset: {}", manager.path().display());
                }
            }
            Ok(0)
        }
    }
}
