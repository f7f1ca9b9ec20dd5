//! # 分享图片交接 — 命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与平台适配器装配。
//! 交接逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use share_handoff::error::AppError;
use share_handoff::handoff::{
    HandoffConfig, HandoffController, ShareItem, ShareRequest, SharedInbox,
};
use share_handoff::platform::{
    DataUrlAttachment, DesktopNotifier, FileAttachment, InlineAttachment, SchemeLauncher,
    TerminalHost,
};
use share_handoff::settings;

#[derive(Parser)]
#[command(name = "share-handoff")]
#[command(
    about = "Hand a shared image over to the analyzer app through a shared container",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Producer side: persist the first decodable image and wake the consumer
    Send {
        /// Image sources in share order: a file path, a `data:` URL, or `-` for stdin
        sources: Vec<String>,

        /// Settings file (defaults to the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Consumer side: read the pending image from the shared container
    Receive {
        /// Leave the pending image in place
        #[arg(long)]
        keep: bool,

        /// Write the JPEG artifact to this path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Settings file (defaults to the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Consumer side: provision the shared container
    Init {
        /// Settings file (defaults to the user config dir)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Send { sources, config } => {
            send(sources, config.as_deref()).await;
            Ok(())
        }
        Commands::Receive {
            keep,
            output,
            config,
        } => receive(keep, output.as_deref(), config.as_deref()),
        Commands::Init { config } => init(config.as_deref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("share-handoff: {err}");
            ExitCode::FAILURE
        }
    }
}

/// 生产者：任何结局都静默结束，退出码恒为 0。
async fn send(sources: Vec<String>, config_path: Option<&Path>) {
    let config = match settings::load_config(config_path) {
        Ok(config) => config,
        Err(err) => {
            log::error!("❌ 配置加载失败，放弃本次交接：{err}");
            return;
        }
    };

    let request = match build_request(&sources, &config).await {
        Ok(request) => request,
        Err(err) => {
            log::error!("❌ 读取分享内容失败：{err}");
            return;
        }
    };

    let controller = HandoffController::new(
        config,
        Arc::new(SchemeLauncher::default()),
        Arc::new(DesktopNotifier::default()),
        Arc::new(TerminalHost),
    );

    if let Some(report) = controller.run(&request).await {
        log::debug!("交接结果: {:?}", report);
    }
}

/// 每个来源对应一个 `ShareItem`，保持参数顺序。
async fn build_request(
    sources: &[String],
    config: &HandoffConfig,
) -> Result<ShareRequest, AppError> {
    let mut items = Vec::with_capacity(sources.len());
    let mut stdin_used = false;

    for source in sources {
        let attachment = if source == "-" {
            if stdin_used {
                log::warn!("⚠️ 标准输入只能读取一次，忽略重复的 `-`");
                continue;
            }
            stdin_used = true;
            InlineAttachment::read_limited(tokio::io::stdin(), config.max_file_size)
                .await?
                .into_attachment()
        } else if source.starts_with("data:") {
            DataUrlAttachment::new(source.as_str(), config.max_file_size).into_attachment()
        } else {
            FileAttachment::new(source.as_str()).into_attachment()
        };
        items.push(ShareItem::new(vec![attachment]));
    }

    Ok(ShareRequest::new(items))
}

fn receive(keep: bool, output: Option<&Path>, config_path: Option<&Path>) -> Result<(), AppError> {
    let config = settings::load_config(config_path)?;
    let inbox = SharedInbox::open(&config)?;

    let pending = if keep { inbox.peek()? } else { inbox.take()? };
    let Some(pending) = pending else {
        println!("no pending image");
        return Ok(());
    };

    if let Some(output) = output {
        std::fs::write(output, &pending.jpeg)?;
        log::info!("💾 共享图片已导出 - {}", output.display());
    }

    let shared_at = pending
        .marker
        .timestamp()
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_default();
    println!(
        "{}\t{}x{}\t{}",
        pending.marker.to_file_contents(),
        pending.width,
        pending.height,
        shared_at
    );
    Ok(())
}

fn init(config_path: Option<&Path>) -> Result<(), AppError> {
    let config = settings::load_config(config_path)?;

    if let Some(path) = config_path {
        if !path.exists() {
            settings::save_config(path, &config)?;
            log::info!("📝 已写入默认配置 - {}", path.display());
        }
    }

    let inbox = SharedInbox::provision(&config)?;
    println!("{}", inbox.store().root().display());
    Ok(())
}
