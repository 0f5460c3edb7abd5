//! trajgen - 具身智能轨迹生成
//!
//! 入口：初始化日志、加载配置，然后对一个场景的任务文件跑完整批处理。

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use trajgen::{batch::run_batch, config::load_config, observability};

#[derive(Parser)]
#[command(name = "trajgen", version, about = "Generate robot task trajectories in a simulated scene")]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// 场景名（覆盖 batch.scene）
    #[arg(long)]
    scene: Option<String>,
    /// 任务类型（覆盖 batch.task_type）
    #[arg(long)]
    task_type: Option<String>,
    /// 从 stdin 读取操作员回答
    #[arg(long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();
    let cli = Cli::parse();

    let mut config = load_config(cli.config).context("Failed to load configuration")?;
    if let Some(scene) = cli.scene {
        config.batch.scene = scene;
    }
    if let Some(task_type) = cli.task_type {
        config.batch.task_type = task_type;
    }
    if cli.interactive {
        config.clarification.interactive = true;
    }

    let summary = run_batch(config).await.context("Batch run failed")?;
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
