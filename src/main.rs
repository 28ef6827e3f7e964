use clap::Parser;
use zealrouter::cli::{run_cli, Cli};
use zealrouter::{demo, isolated};

fn main() -> anyhow::Result<()> {
    // Started by the isolated executor: serve one task and leave.
    if let Some(code) = isolated::maybe_run_worker(&demo::tasks()) {
        std::process::exit(code);
    }
    run_cli(Cli::parse())
}
