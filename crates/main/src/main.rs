//! Flashbots bundle 提交工具
//!
//! 使用方法:
//!   # 发送两笔 0.001 ETH 转账 (随机接收地址)
//!   cargo run -p flashbots_bundler -- send --simulate
//!
//!   # 提交 JSON 文件中的 bundle
//!   cargo run -p flashbots_bundler -- submit --file bundle.json
//!
//!   # 取消中继上的 bundle
//!   cargo run -p flashbots_bundler -- cancel <replacement-uuid>

mod bootstrap;

use anyhow::Result;
use clap::{Parser, Subcommand};
use config_crate::AppConfig;
use ethers::types::Address;
use std::path::PathBuf;
use tracing::info;
use utils::LoggerManager;
use uuid::Uuid;

use crate::bootstrap::{setup_panic_hook, Application, TransferArgs};

#[derive(Parser)]
#[command(name = "flashbots_bundler")]
#[command(about = "通过 Flashbots 中继提交交易包")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 发送两笔 EIP-1559 转账组成的 bundle
    Send {
        /// 接收地址（默认随机生成）
        #[arg(long)]
        receiver: Option<Address>,

        /// 每笔转账金额 (ETH)
        #[arg(long, default_value = "0.001")]
        amount_eth: String,

        /// maxFeePerGas (gwei)
        #[arg(long, default_value = "200")]
        max_fee_gwei: u64,

        /// maxPriorityFeePerGas (gwei)
        #[arg(long, default_value = "50")]
        priority_fee_gwei: u64,

        /// 发送前先用 eth_callBundle 模拟
        #[arg(long)]
        simulate: bool,
    },

    /// 提交 JSON 文件描述的 bundle
    Submit {
        /// bundle 文件路径
        #[arg(short, long)]
        file: PathBuf,

        /// 发送前先用 eth_callBundle 模拟
        #[arg(long)]
        simulate: bool,
    },

    /// 按 replacementUuid 取消中继上的 bundle
    Cancel {
        replacement_uuid: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // 解析命令行参数
    let cli = Cli::parse();

    // 加载配置
    let config = AppConfig::load()?;

    // 初始化日志系统
    let _logger = LoggerManager::init(&config.log.dir, &config.log.level);

    // 设置 panic hook
    setup_panic_hook();

    info!("========================================");
    info!("  Flashbots Bundle 提交工具启动");
    info!("========================================");

    let app = Application::new(config)?;

    match cli.command {
        Commands::Send {
            receiver,
            amount_eth,
            max_fee_gwei,
            priority_fee_gwei,
            simulate,
        } => {
            app.send_transfers(TransferArgs {
                receiver,
                amount_eth,
                max_fee_gwei,
                priority_fee_gwei,
                simulate,
            })
            .await?
        }
        Commands::Submit { file, simulate } => app.submit_file(&file, simulate).await?,
        Commands::Cancel { replacement_uuid } => app.cancel(replacement_uuid).await?,
    }

    Ok(())
}
