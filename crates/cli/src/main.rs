use clap::Parser;

use digestflow_cli::Cli;
use digestflow_observability::LogConfig;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    digestflow_observability::init_with(&LogConfig::from_env().with_level(level));

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    digestflow_cli::run(&cli, &mut out)
}
