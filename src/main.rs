mod bulk;
mod completion;
mod config;
mod invoker;
mod menu;
mod pool;
mod prompts;
mod records;
mod retry;
mod salesforce;
mod synthesis;
#[cfg(test)]
mod testing;
mod types;

use anyhow::{Context, Result};
use bulk::BulkOperations;
use completion::OpenAiClient;
use config::Config;
use invoker::DeadlineInvoker;
use menu::MenuChoice;
use records::RecordAdapter;
use retry::RetryingCaller;
use salesforce::SalesforceClient;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use synthesis::{CaseSynthesizer, SynthesisSettings};
use tokio::io::{AsyncBufReadExt, BufReader, Stdin};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing_subscriber::EnvFilter;

type Input = LinesStream<BufReader<Stdin>>;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config_path = Config::resolve_path(std::env::args().nth(1).map(PathBuf::from));
    let config = Config::load(&config_path)?;

    let salesforce = SalesforceClient::login(&config.salesforce)
        .await
        .context("failed to authenticate with salesforce")?;
    let openai = OpenAiClient::new(&config.openai)?;

    let caller = RetryingCaller::new(
        DeadlineInvoker::new(Arc::new(openai)),
        config.generation.policy(),
    );
    let records = RecordAdapter::new(Arc::new(salesforce), config.records.policy());
    let synthesizer =
        CaseSynthesizer::new(caller, records, SynthesisSettings::from_config(&config));
    let operations = BulkOperations::new(synthesizer, config.pool.workers);

    let mut input: Input = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    run_menu(&operations, &mut input).await
}

async fn run_menu(operations: &BulkOperations, input: &mut Input) -> Result<()> {
    loop {
        println!("{}", menu::MENU);
        let Some(line) = prompt_line(input, menu::CHOICE_PROMPT).await? else {
            return Ok(());
        };

        let choice = match menu::parse_choice(&line) {
            Ok(choice) => choice,
            Err(_) => {
                println!("Invalid choice. Please try again.");
                continue;
            }
        };

        match choice {
            MenuChoice::Generate => {
                let Some(count) = prompt_case_count(input).await? else {
                    return Ok(());
                };
                operations.generate(count).await;
            }
            MenuChoice::Retag => {
                if let Err(err) = operations.retag_all().await {
                    println!("Update aborted: {err:#}");
                }
            }
            MenuChoice::DeleteAll => {
                if let Err(err) = operations.delete_all().await {
                    println!("Delete aborted: {err:#}");
                }
            }
            MenuChoice::Quit => return Ok(()),
        }
    }
}

async fn prompt_case_count(input: &mut Input) -> Result<Option<usize>> {
    loop {
        let Some(line) = prompt_line(input, menu::COUNT_PROMPT).await? else {
            return Ok(None);
        };
        match menu::parse_case_count(&line) {
            Ok(count) => return Ok(Some(count)),
            Err(err) => println!("{err}"),
        }
    }
}

/// `None` once stdin is closed.
async fn prompt_line(input: &mut Input, prompt: &str) -> Result<Option<String>> {
    print!("{prompt}");
    std::io::stdout().flush().context("failed to flush stdout")?;
    match input.next().await {
        Some(line) => Ok(Some(line.context("failed to read stdin")?)),
        None => Ok(None),
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
