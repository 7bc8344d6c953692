use clap::Parser;

#[tokio::main]
async fn main() {
    let cli = relaymesh::cli::Cli::parse();
    if let Err(e) = relaymesh::cmd::dispatch(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
