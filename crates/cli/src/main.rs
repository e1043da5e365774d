use anyhow::{anyhow, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use guestpass::{
    png_file_name, CodeState, PromoterStats, QrEncoder, RedemptionLedger, Store,
    StoreConfig, DEFAULT_DATABASE_URL,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "guestpass")]
#[command(about = "Issue, scan and report single-use promoter passes")]
struct Args {
    #[arg(long, env = "DATABASE_URL", default_value = DEFAULT_DATABASE_URL)]
    database_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create the database schema
    Init,
    /// Issue codes for a promoter and write their QR images
    Issue {
        #[arg(value_name = "PROMOTER_ID")]
        promoter_id: String,

        #[arg(short, long, default_value = "static")]
        out: PathBuf,

        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Redeem a scanned code
    Redeem {
        #[arg(value_name = "CODE")]
        code: String,
    },
    /// Show where a code is in its lifecycle
    Status {
        #[arg(value_name = "CODE")]
        code: String,
    },
    /// Redemptions per promoter
    Stats,
}

fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

fn format_stats(stats: &[PromoterStats]) -> String {
    if stats.is_empty() {
        return "  No codes issued yet\n".to_string();
    }

    let width = stats
        .iter()
        .map(|s| s.promoter_id.chars().count())
        .max()
        .unwrap_or(0)
        .max("PROMOTER".len());

    let mut out = format!("  {:<width$}  {:>8}  {:>8}\n", "PROMOTER", "ISSUED", "REDEEMED");
    for s in stats {
        out.push_str(&format!(
            "  {:<width$}  {:>8}  {:>8}\n",
            s.promoter_id, s.issued, s.redeemed
        ));
    }
    let issued: u64 = stats.iter().map(|s| s.issued).sum();
    let redeemed: u64 = stats.iter().map(|s| s.redeemed).sum();
    out.push_str(&format!(
        "  {:<width$}  {:>8}  {:>8}\n",
        "TOTAL", issued, redeemed
    ));
    out
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let store = Store::open(&StoreConfig::new(&args.database_url)).await?;
    let ledger = RedemptionLedger::new(store);

    let outcome = run(&ledger, args.command).await;
    ledger.store().close().await;
    outcome
}

async fn run(ledger: &RedemptionLedger, command: Command) -> Result<()> {
    match command {
        Command::Init => {
            println!("Schema ready");
        }
        Command::Issue {
            promoter_id,
            out,
            count,
        } => {
            let encoder = QrEncoder::default();
            println!();
            println!("  Promoter: {}", promoter_id);
            println!("  Output:   {}", out.display());
            println!();
            for _ in 0..count {
                let code = ledger.registry().issue(&promoter_id).await?;
                let path = encoder.save_png(&code.code, &out, &png_file_name(&code.code))?;
                println!("  {}  {}", code.code, path.display());
            }
        }
        Command::Redeem { code } => match ledger.redeem(code.trim()).await {
            Ok(receipt) => {
                println!("ACCEPTED");
                println!("  Promoter: {}", receipt.promoter_id);
                println!("  At:       {}", local_time(&receipt.redeemed_at));
            }
            Err(e) if e.is_rejection() => {
                println!("REJECTED");
                return Err(anyhow!(e));
            }
            Err(e) => return Err(e.into()),
        },
        Command::Status { code } => match ledger.status(code.trim()).await? {
            CodeState::Unknown => println!("UNKNOWN: no such code"),
            CodeState::Issued { promoter_id } => {
                println!("ISSUED");
                println!("  Promoter: {}", promoter_id);
            }
            CodeState::Redeemed {
                promoter_id,
                redeemed_at,
            } => {
                println!("REDEEMED");
                println!("  Promoter: {}", promoter_id);
                println!("  At:       {}", local_time(&redeemed_at));
            }
        },
        Command::Stats => {
            let stats = ledger.stats().await?;
            println!();
            print!("{}", format_stats(&stats));
        }
    }
    Ok(())
}
