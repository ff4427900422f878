mod auth;
mod commands;
mod constants;
mod error;
mod logger;
mod proxy;

use tracing::error;

use crate::constants::DEFAULT_PORT;
use crate::error::{AppError, AppResult};

#[tokio::main]
async fn main() {
    logger::init_logger();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "read" => commands::token::read_token(),
        "refresh" => commands::token::refresh_token().await,
        "export" => commands::token::export_env_vars(),
        "claude" => commands::claude::enable_claude_code(),
        "server" => match parse_port(args.get(2)) {
            Ok(port) => proxy::server::serve(port).await,
            Err(e) => Err(e),
        },
        other => {
            eprintln!("Unknown command: {}", other);
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn parse_port(arg: Option<&String>) -> AppResult<u16> {
    match arg {
        None => Ok(DEFAULT_PORT),
        Some(p) => p.parse().map_err(|_| AppError::InvalidPort(p.clone())),
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  kiro2cc read          - print the cached Kiro token");
    eprintln!("  kiro2cc refresh       - refresh the token and persist it");
    eprintln!("  kiro2cc export        - print ANTHROPIC_* env exports");
    eprintln!("  kiro2cc claude        - prepare Claude Code to use the proxy");
    eprintln!("  kiro2cc server [port] - start the proxy server (default {})", DEFAULT_PORT);
}
