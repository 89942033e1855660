use clap::Parser;

use screpair::cli::{Cli, Config};
use screpair::{logging, orchestrator};

#[tokio::main]
async fn main() {
  logging::init();

  let cli = Cli::parse();
  let config = match Config::from_cli(cli) {
    Ok(config) => config,
    Err(err) => {
      eprintln!("fatal error: {err}");
      std::process::exit(1);
    }
  };

  let exit_code = orchestrator::run(config).await;
  std::process::exit(exit_code);
}
