//! Line-oriented terminal loops.
//!
//! Both loops read from any buffered async reader and write to any
//! [`Write`], so they can be driven from tests. They end on an exit
//! keyword, at end of input, or when `shutdown` resolves.

use std::io::{self, Write};
use std::pin::pin;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use tickerbot_core::Reply;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::select;

use crate::session::Session;

/// Words that end the price loop, compared case-insensitively.
pub const PRICE_EXIT_KEYWORDS: &[&str] = &["exit", "quit", "q"];

/// Words that end the chat loop, compared case-insensitively.
pub const CHAT_EXIT_KEYWORDS: &[&str] = &["exit", "quit"];

const PRICE_PROMPT: &str =
    "Enter stock symbol (e.g., MSFT, AAPL, TSLA or 'exit' to quit): ";
const INTERRUPTED: &str = "\nUser interrupted the program. Exiting...";

const BAR_CHAR: &str = "▎";

/// Returns `true` if `input` is one of `keywords`, ignoring case.
#[inline]
pub fn is_exit_keyword(input: &str, keywords: &[&str]) -> bool {
    keywords
        .iter()
        .any(|keyword| input.eq_ignore_ascii_case(keyword))
}

/// Asks for stock symbols and prints their prices until told to stop.
///
/// Request failures are reported inline and never end the loop.
pub async fn run_price_loop<R, W, S>(
    session: &Session,
    mut input: R,
    output: &mut W,
    shutdown: S,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut shutdown = pin!(shutdown);

    loop {
        write!(output, "{PRICE_PROMPT}")?;
        output.flush()?;

        let line = select! {
            _ = &mut shutdown => {
                writeln!(output, "{INTERRUPTED}")?;
                return Ok(());
            }
            line = read_line(&mut input) => line?,
        };
        let Some(line) = line else {
            writeln!(output)?;
            return Ok(());
        };

        let line = line.trim();
        if is_exit_keyword(line, PRICE_EXIT_KEYWORDS) {
            writeln!(output, "Exiting program. Goodbye!")?;
            return Ok(());
        }
        if line.is_empty() {
            continue;
        }

        let spinner = spinner("📈 Looking up the price...");
        let result = select! {
            _ = &mut shutdown => {
                spinner.finish_and_clear();
                writeln!(output, "{INTERRUPTED}")?;
                return Ok(());
            }
            result = session.handle_request(line) => result,
        };
        spinner.finish_and_clear();

        match result {
            Ok(answer) => writeln!(
                output,
                "{}{}",
                BAR_CHAR.bright_cyan(),
                answer.bright_white()
            )?,
            Err(err) => {
                error!("request for `{line}` failed: {err}");
                writeln!(output, "An error occurred: {err}")?;
            }
        }
    }
}

/// Sends free-form questions to the model and prints its answers.
pub async fn run_chat_loop<R, W, S>(
    session: &Session,
    mut input: R,
    output: &mut W,
    shutdown: S,
) -> io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: Future<Output = ()>,
{
    let mut shutdown = pin!(shutdown);

    writeln!(output, "Welcome! Enter your question (or 'exit' to quit):")?;
    loop {
        write!(output, "\nYour question: ")?;
        output.flush()?;

        let line = select! {
            _ = &mut shutdown => {
                writeln!(output, "{INTERRUPTED}")?;
                return Ok(());
            }
            line = read_line(&mut input) => line?,
        };
        let Some(line) = line else {
            break;
        };

        let question = line.trim();
        if is_exit_keyword(question, CHAT_EXIT_KEYWORDS) {
            break;
        }
        if question.is_empty() {
            writeln!(output, "{}", "⚠ Please enter a valid question.".yellow())?;
            continue;
        }

        let spinner = spinner("🤔 Thinking...");
        let answer = select! {
            _ = &mut shutdown => {
                spinner.finish_and_clear();
                writeln!(output, "{INTERRUPTED}")?;
                return Ok(());
            }
            answer = session.model().ask(question) => answer,
        };
        spinner.finish_and_clear();

        writeln!(output, "\nModel response:\n")?;
        writeln!(output, "{}", Reply::parse(&answer))?;
    }

    writeln!(output, "\nProgram finished. Goodbye!")?;
    Ok(())
}

/// Reads one line, `None` at end of input.
async fn read_line<R: AsyncBufRead + Unpin>(
    input: &mut R,
) -> io::Result<Option<String>> {
    let mut line = String::new();
    let count = input.read_line(&mut line).await?;
    Ok((count > 0).then_some(line))
}

fn spinner(message: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {wide_msg}") {
        spinner.set_style(style.tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"));
    }
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
