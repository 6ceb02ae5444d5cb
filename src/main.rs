use clap::Parser;
use vera_jobs::cli::{Cli, execute_command, init_logger_from_settings, load_and_merge_config};
use vera_jobs::server::Server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = load_and_merge_config(&cli)?;
    init_logger_from_settings(&settings)?;

    if cli.starts_server() {
        cli.validate().map_err(anyhow::Error::msg)?;
        return Server::new(settings).run().await;
    }

    execute_command(&cli, settings).await?;
    Ok(())
}
