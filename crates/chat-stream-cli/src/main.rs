//! `ask`: stream answers from the chat service into the terminal.

use std::io::Write as _;

use chat_stream_client::observability::init_observability;
use chat_stream_client::prelude::*;
use clap::Parser;
use tracing::debug;

#[derive(Debug, Parser)]
#[command(name = "ask", about = "Ask the chat service a question")]
struct Cli {
    /// Question to ask. Starts an interactive prompt when omitted.
    question: Vec<String>,
    /// Service base URL (overrides CHAT_BASE_URL).
    #[arg(long)]
    base_url: Option<String>,
    /// Skip streaming and wait for the full JSON answer.
    #[arg(long)]
    json: bool,
    /// Print the service health status and exit.
    #[arg(long)]
    health: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_observability();
    let cli = Cli::parse();

    let mut config = ClientConfig::from_env()?;
    if let Some(base_url) = cli.base_url.clone() {
        config = config.base_url(base_url);
    }
    let client = ChatClient::new(config)?;

    if cli.health {
        let health = client.health().await?;
        println!("{}", serde_json::to_string_pretty(&health)?);
        return Ok(());
    }

    let question = cli.question.join(" ");
    if !question.trim().is_empty() {
        ask(&client, &question, cli.json).await?;
        return Ok(());
    }

    interactive(&client, cli.json).await
}

async fn interactive(client: &ChatClient, json_only: bool) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Connected to {}. Type 'exit' to quit.", client.config().base_url);
    let stdin = std::io::stdin();
    loop {
        eprint!("\nYou: ");
        std::io::stderr().flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 || is_exit_command(&line) {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }
        // A failed question should not end the session.
        if let Err(err) = ask(client, &line, json_only).await {
            eprintln!("Error: {}", err.message());
        }
    }
}

fn is_exit_command(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "exit" | "quit")
}

async fn ask(client: &ChatClient, question: &str, json_only: bool) -> Result<(), ChatError> {
    if json_only {
        let outcome = client.ask_json(question).await?;
        println!("{}", outcome.full_text);
        return Ok(());
    }

    let mut stream = client.start_stream(question).await?;
    let abort = stream.abort_handle();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            abort.abort();
        }
    });

    let mut stdout = std::io::stdout();
    while let Some(event) = stream.next_event().await {
        match event {
            ChatEvent::Delta { text, .. } => {
                print!("{text}");
                let _ = stdout.flush();
            }
            ChatEvent::FallbackStarted { reason, .. } => {
                eprintln!("\n[stream failed: {}; waiting for full answer]", reason.message());
            }
            ChatEvent::Completed { result, .. } => {
                debug!(source = ?result.source, "answer complete");
                if result.source == ResultSource::Fallback {
                    print!("{}", result.text());
                }
                println!();
            }
            ChatEvent::Error { .. } => println!(),
            ChatEvent::Started { .. } => {}
        }
    }
    ctrl_c.abort();

    stream.finish().await.map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_words_are_case_insensitive() {
        assert!(is_exit_command("exit\n"));
        assert!(is_exit_command("  QUIT "));
        assert!(!is_exit_command("exit now"));
    }

    #[test]
    fn question_words_are_collected() {
        let cli = Cli::try_parse_from(["ask", "--json", "what", "is", "this?"]).expect("parse");
        assert!(cli.json);
        assert_eq!(cli.question.join(" "), "what is this?");
        assert_eq!(cli.base_url, None);
    }

    #[test]
    fn base_url_and_health_flags_parse() {
        let cli = Cli::try_parse_from(["ask", "--health", "--base-url", "http://x:1"]).expect("parse");
        assert!(cli.health);
        assert_eq!(cli.base_url.as_deref(), Some("http://x:1"));
        assert!(cli.question.is_empty());
    }
}
