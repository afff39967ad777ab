use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use nl2sql_rs::adk::error::Nl2SqlError;
use nl2sql_rs::nl2sql::config::Config;
use nl2sql_rs::nl2sql::db::SqliteDatabase;
use nl2sql_rs::nl2sql::schema::{ConnectionHandle, SchemaProvider};
use nl2sql_rs::nl2sql::workflow::builder::Builder;
use nl2sql_rs::nl2sql::workflow::graph::Outcome;
use nl2sql_rs::nl2sql::workflow::state::WorkflowState;

use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Answer a natural-language question against the database
    Ask {
        /// The question to answer
        #[arg(short, long)]
        question: String,

        /// Turn the results into a natural-language answer
        #[arg(short, long)]
        format: bool,

        /// Override MAX_SQL_FIX_ATTEMPTS
        #[arg(short, long)]
        max_fix_attempts: Option<u32>,

        /// Print the full final state as JSON
        #[arg(long)]
        json: bool,

        /// Abort the run after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,
    },
    /// Print the database schema
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Ask {
            question,
            format,
            max_fix_attempts,
            json,
            timeout_secs,
        } => {
            let mut config = Config::from_env().context("failed to load configuration")?;
            if format {
                config.engine.format_output = true;
            }
            if let Some(max) = max_fix_attempts {
                config.engine.max_sql_fix_attempts = max;
            }

            let engine = Builder::new(config).build()?;
            let initial = WorkflowState::new(question);
            let state = match timeout_secs {
                Some(secs) => {
                    engine
                        .run_with_timeout(initial, Duration::from_secs(secs))
                        .await?
                }
                None => engine.run(initial).await?,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&state)?);
            } else {
                if let Some(sql) = &state.validated_sql {
                    log::info!("Executed SQL: {}", sql);
                }
                let answer = state
                    .last_message()
                    .map(|m| m.content.clone())
                    .unwrap_or_default();
                println!("{}", answer);
            }

            if let Some(Outcome::Failed { failure }) = &state.outcome {
                return Err(Nl2SqlError::other(failure.to_string()).into());
            }
        }
        Commands::Schema => {
            let url = Config::database_url_from_env().context("failed to load configuration")?;
            let db = SqliteDatabase::new(ConnectionHandle::new(url));
            let schema = db.fetch(db.connection()).await?;
            print!("{}", schema.render());
        }
    }

    Ok(())
}
