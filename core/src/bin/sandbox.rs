/// Sandbox CLI
///
/// Hosts one editor session over stdin/stdout, or runs SQL files through the
/// query runner for dataset debugging.

use sandbox_core::cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
