//! 给 Firebase 用户设置 / 撤销 `admin` 自定义声明
//!
//! ```bash
//! cargo run --bin set-admin -- <uid>
//! cargo run --bin set-admin -- <uid> --revoke
//! ```
//!
//! 用户需重新登录（或刷新 ID token）后新声明才会生效。

use anyhow::{Context, Result};
use clap::Parser;
use env_logger::Env;

use zlma_backend::{
    config::Config,
    external::{FirebaseAuth, IdentityProvider},
};

#[derive(Parser)]
#[command(name = "set-admin", about = "Grant or revoke the admin claim on a Firebase user")]
struct Args {
    /// Firebase 用户 UID
    uid: String,

    /// 撤销管理员权限
    #[arg(long)]
    revoke: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::from_toml()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Failed to load configuration")?;
    let firebase = FirebaseAuth::new(&config.firebase).context("Failed to initialise Firebase")?;

    let is_admin = !args.revoke;
    firebase
        .set_admin_claim(&args.uid, is_admin)
        .await
        .with_context(|| format!("Failed to update admin claim for {}", args.uid))?;

    log::info!("Admin claim for {} set to {is_admin}", args.uid);
    Ok(())
}
