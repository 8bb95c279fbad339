use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = grayroute::cli::Cli::parse();
    if let Err(e) = grayroute::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
