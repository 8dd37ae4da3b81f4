#[tokio::main]
async fn main() {
    if let Err(e) = polarity::cli::run_main().await {
        eprintln!("polarity: {e:#}");
        std::process::exit(1);
    }
}
