mod daemon;

use anyhow::Result;
use std::path::PathBuf;

use crate::core::config::Config;
use crate::core::events::ResetKind;
use crate::logging;

fn print_help() {
    println!("polarity - Destiny 2 reset signal relay and infographic watcher");
    println!();
    println!("Usage: polarity <command> [flags]");
    println!();
    println!("Commands:");
    println!("  run          Run the signal relay, url watcher and autopost trigger");
    println!("  scheduler    Run the reset scheduler (intended as a separate process)");
    println!("  signal <q>   Manually fire a reset signal (daily|weekly|weekend)");
    println!("  help         Show this help");
    println!();
    println!("Flags:");
    println!("  --data-dir <path>   Data directory (default: $POLARITY_DATA_DIR or the OS data dir)");
    println!("  --api-host <host>   Relay bind host (default 127.0.0.1)");
    println!("  --api-port <port>   Relay port (default 17650)");
    println!("  --verbose           Debug logging");
}

#[derive(Debug, Clone, Default)]
pub(crate) struct CliFlags {
    pub data_dir: Option<PathBuf>,
    pub api_host: Option<String>,
    pub api_port: Option<u16>,
    pub verbose: bool,
}

pub(crate) fn parse_flags(args: &[String], start: usize) -> CliFlags {
    let mut flags = CliFlags::default();
    let mut i = start;
    while i < args.len() {
        match args[i].as_str() {
            "--data-dir" => {
                if i + 1 < args.len() {
                    flags.data_dir = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-host" => {
                if i + 1 < args.len() {
                    flags.api_host = Some(args[i + 1].clone());
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--api-port" => {
                if i + 1 < args.len() {
                    flags.api_port = args[i + 1].parse().ok();
                    i += 2;
                } else {
                    i += 1;
                }
            }
            "--verbose" => {
                flags.verbose = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    flags
}

pub(crate) fn resolve_data_dir(flags: &CliFlags) -> PathBuf {
    if let Some(dir) = &flags.data_dir {
        return dir.clone();
    }
    if let Ok(dir) = std::env::var("POLARITY_DATA_DIR") {
        return PathBuf::from(dir);
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("polarity")
}

async fn resolved_api_port(flags: &CliFlags) -> Result<u16> {
    if let Some(port) = flags.api_port {
        return Ok(port);
    }
    let config = Config::load(resolve_data_dir(flags)).await?;
    Ok(config.relay.api_port)
}

pub async fn run_main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    match args[1].as_str() {
        "run" => {
            let flags = parse_flags(&args, 2);
            logging::init(flags.verbose);
            daemon::run(flags).await
        }
        "scheduler" => {
            let flags = parse_flags(&args, 2);
            logging::init(flags.verbose);
            let api_port = resolved_api_port(&flags).await?;
            crate::scheduler::run(api_port).await
        }
        "signal" => {
            if args.len() < 3 {
                print_help();
                anyhow::bail!("signal requires a qualifier");
            }
            let Some(kind) = ResetKind::from_qualifier(args[2].as_str()) else {
                anyhow::bail!(
                    "unknown reset qualifier '{}', expected daily, weekly or weekend",
                    args[2]
                );
            };
            let flags = parse_flags(&args, 3);
            logging::init(flags.verbose);
            let api_port = resolved_api_port(&flags).await?;
            let client = reqwest::Client::new();
            crate::scheduler::post_signal(&client, api_port, kind).await;
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        other => {
            print_help();
            anyhow::bail!("unknown command '{}'", other);
        }
    }
}
