use std::io;

use clap::Parser;
use tabsense_lib::cli::{self, Cli, Command};
use tabsense_lib::{settings::Settings, utils::logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let settings = Settings::from_env(args.config.as_deref())?;
    logging::init(settings.log_file.as_deref())?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => tabsense_lib::run(settings).await,
        Command::Entry { command } => {
            let db = cli::open_store(&settings)?;
            cli::run_entry_command(command, &db, &mut io::stdout()).await
        }
        Command::Clients => {
            let db = cli::open_store(&settings)?;
            cli::run_clients_command(&db, &mut io::stdout()).await
        }
    }
}
