// crates.io
use clap::Parser;
// self
use sieve_plan::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;
	let args = Args::parse();
	sieve_plan::run(args).await
}
