//! The `tickerbot` command: ask for stock symbols, print their prices.

#[macro_use]
extern crate tracing;

use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tickerbot::core::{ModelHandle, ModelSettings};
use tickerbot::market::{MarketData, YahooFinance};
use tickerbot::{Dispatcher, Session, repl};
use tickerbot_ollama_model::{
    DEFAULT_BASE_URL, Error as OllamaError, OllamaConfigBuilder,
    OllamaProvider,
};
use tokio::io::{self, BufReader};
use tokio::runtime;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about = "Look up current stock prices with a local model")]
struct Cli {
    /// Name of the Ollama model.
    #[arg(long, env = "TICKERBOT_MODEL", default_value = "llama3.2")]
    model: String,

    /// Address of the Ollama server.
    #[arg(long, env = "OLLAMA_HOST", default_value = DEFAULT_BASE_URL)]
    ollama_url: String,

    /// Look prices up without asking the model.
    #[arg(long)]
    direct: bool,

    /// Maximum number of model turns per request.
    #[arg(long, default_value_t = 5)]
    max_iterations: usize,

    /// Print debug logs.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Clone, Copy, Default, Subcommand)]
enum Command {
    /// Ask for stock symbols and print their prices.
    #[default]
    Prices,
    /// Ask the model free-form questions.
    Chat,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let runtime =
        match runtime::Builder::new_current_thread().enable_all().build() {
            Ok(runtime) => runtime,
            Err(err) => {
                eprintln!("Failed to start the async runtime: {err}");
                return ExitCode::FAILURE;
            }
        };
    let code = runtime.block_on(run(cli));
    // A pending stdin read sits on a blocking thread and cannot be joined.
    runtime.shutdown_background();
    code
}

async fn run(cli: Cli) -> ExitCode {
    let ollama_url = cli.ollama_url.clone();
    let model = ModelHandle::initialize(
        ModelSettings::new(cli.model.clone()),
        move |settings| -> Result<_, OllamaError> {
            let config = OllamaConfigBuilder::with_model(&settings.model)
                .with_base_url(ollama_url)
                .build()?;
            OllamaProvider::new(config)
        },
    );

    let market: Arc<dyn MarketData> = match YahooFinance::new() {
        Ok(market) => Arc::new(market),
        Err(err) => {
            eprintln!("Failed to set up the market data client: {err}");
            return ExitCode::FAILURE;
        }
    };

    let dispatcher = match model.client() {
        Some(client) if !cli.direct => {
            Dispatcher::agent(client.clone(), market, cli.max_iterations)
        }
        Some(_) => Dispatcher::Direct(market),
        None => {
            warn!("model is not available, looking prices up directly");
            Dispatcher::Direct(market)
        }
    };
    let session = Session::new(model, dispatcher);

    let input = BufReader::new(io::stdin());
    let mut output = std::io::stdout();
    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("cannot listen for the interrupt signal: {err}");
            std::future::pending::<()>().await;
        }
    };

    let result = match cli.command.unwrap_or_default() {
        Command::Prices => {
            repl::run_price_loop(&session, input, &mut output, shutdown).await
        }
        Command::Chat => {
            repl::run_chat_loop(&session, input, &mut output, shutdown).await
        }
    };

    if let Err(err) = output.flush() {
        error!("cannot flush stdout: {err}");
    }
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Terminal error: {err}");
            ExitCode::FAILURE
        }
    }
}
