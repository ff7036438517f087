use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the builder configuration JSON.
    #[arg(short, long)]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let config = tilia::config::load_config(&args.config)?;
    tilia::builder::build(&config)
}
