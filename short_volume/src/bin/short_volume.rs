use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use short_volume::{
    db::{connection, migrate},
    feed::{self, FEED_URL_BASE},
    import_day,
};
use tracing::info;

#[derive(Parser)]
#[command(version, about = "Daily short-sale volume importer")]
struct Cli {
    /// SQLite database path or sqlite:// URL (defaults to $DATABASE_URL)
    #[arg(long, global = true)]
    database_url: Option<String>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations
    Migrate,

    /// Download one day's file and store its rows
    Import {
        /// Trading day, YYYY-MM-DD or YYYYMMDD
        #[arg(long)]
        date: String,

        /// Base URL the daily files are published under
        #[arg(long, default_value = FEED_URL_BASE)]
        url_base: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    shared_utils::logging::init_tracing();
    let cli = Cli::parse();

    let db_url = match cli.database_url {
        Some(url) => url,
        None => shared_utils::env::get_env_var("DATABASE_URL")
            .context("pass --database-url or set DATABASE_URL")?,
    };

    match cli.cmd {
        Cmd::Migrate => {
            let applied = migrate::run_sqlite(&db_url)?;
            println!("applied {applied} migration(s)");
        }
        Cmd::Import { date, url_base } => {
            let date = feed::parse_date(&date)?;
            migrate::run_sqlite(&db_url)?;
            let mut conn = connection::connect_sqlite(&db_url)?;
            let client = feed::client().context("failed to build HTTP client")?;

            info!(%date, %url_base, "importing short volume");
            let written = import_day(&client, &mut conn, &url_base, date)
                .await
                .with_context(|| format!("import for {date} failed"))?;
            println!("{date}: {written} rows");
        }
    }

    Ok(())
}
