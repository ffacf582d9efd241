use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = devlogs_collector::cli::Cli::parse();
    if let Err(e) = devlogs_collector::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
