use std::path::PathBuf;

use clap::Parser;
use flowgate::{app, config::Config, telemetry};

#[derive(Parser, Debug)]
#[command(about = "A rate-limiting HTTP load balancer")]
struct Args {
	/// Path to the YAML configuration file.
	#[arg(long, value_name = "file")]
	path: PathBuf,
}

fn main() -> anyhow::Result<()> {
	let args = Args::parse();
	let config = Config::load(&args.path)?;
	telemetry::init(config.env);

	tokio::runtime::Builder::new_multi_thread()
		.enable_all()
		.build()
		.expect("failed to build tokio runtime")
		.block_on(async move {
			let bound = app::run(config).await?;
			bound.wait_termination().await
		})
}
