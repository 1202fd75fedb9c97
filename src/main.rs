//! ironfolio 命令行入口
//!
//! 用法：
//!   ironfolio [--config <path>] value <portfolio.toml>
//!   ironfolio [--config <path>] history <portfolio.toml> <1D|1W|1M|3M|1Y|ALL>
//!   ironfolio classify <address>

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use ironfolio::{
    config::Config,
    domain::TimeRange,
    infrastructure::logging::init_logging,
    repository::{InMemoryPortfolioRepository, PortfolioFile},
    service::PortfolioService,
    utils::address_classifier::classify,
};
use tokio_util::sync::CancellationToken;

const USAGE: &str = "usage: ironfolio [--config <path>] <value <portfolio.toml> | history <portfolio.toml> <range> | classify <address>>";

#[tokio::main]
async fn main() -> Result<()> {
    // 1. 加载 .env
    dotenvy::dotenv().ok();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let config_path = take_flag(&mut args, "--config").or_else(|| std::env::var("CONFIG_PATH").ok());

    // 2. 配置 + 日志
    let config = Config::from_env_and_file(config_path.as_deref())?;
    init_logging(&config.logging).map_err(|e| anyhow::anyhow!("Failed to init logging: {}", e))?;

    let command = args.first().map(String::as_str).unwrap_or_default();
    match (command, &args[1.min(args.len())..]) {
        ("classify", [address]) => {
            let classification = classify(address);
            print_json(&classification)
        }
        ("value", [portfolio]) => {
            let (service, user_id) = load_service(&config, portfolio).await?;
            let cancel = ctrl_c_token();
            let snapshot = service.snapshot(user_id, &cancel).await?;
            print_json(&snapshot)
        }
        ("history", [portfolio, range]) => {
            let range: TimeRange = range.parse()?;
            let (service, user_id) = load_service(&config, portfolio).await?;
            let cancel = ctrl_c_token();
            let history = service.history(user_id, range, &cancel).await?;
            print_json(&history)
        }
        _ => bail!(USAGE),
    }
}

async fn load_service(config: &Config, portfolio: &str) -> Result<(PortfolioService, uuid::Uuid)> {
    let repo = Arc::new(InMemoryPortfolioRepository::new());
    let user_id = PortfolioFile::from_path(portfolio)?.load_into(&repo).await?;
    tracing::info!(portfolio = %portfolio, user_id = %user_id, "Portfolio file loaded");

    let service = PortfolioService::from_config(config, repo.clone(), repo);
    Ok((service, user_id))
}

/// Ctrl-C 取消正在进行的刷新，已完成的结果照常输出
fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling refresh");
            child.cancel();
        }
    });
    token
}

fn take_flag(args: &mut Vec<String>, flag: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == flag)?;
    args.remove(pos);
    (pos < args.len()).then(|| args.remove(pos))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
