//! Chat with the knowledge bot.
//!
//! Usage:
//!   chat                    interactive loop ('quit' to exit)
//!   chat "a question"       one-shot

use std::env;
use std::io::Write;
use std::time::Instant;

use knowledgebot::rag::compose_agent;
use knowledgebot::{logging, AppConfig, KnowledgeAgent};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load()?;
    logging::init(&config.log_dir);

    let session_id = uuid::Uuid::new_v4();
    tracing::info!(%session_id, "chat session started");

    let mut agent = compose_agent(&config).await?;
    let streaming = config.agent.streaming;

    println!("Knowledge Bot ({} / {})", config.chat_provider.provider_name(), config.chat_provider.model());

    if let Some(question) = env::args().nth(1) {
        ask(&mut agent, &question, streaming).await;
        return Ok(());
    }

    println!("Interactive mode - type your question ('quit' to exit)");

    let stdin = std::io::stdin();
    loop {
        print!("\nYou: ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if matches!(question.to_lowercase().as_str(), "quit" | "exit" | "q") {
            println!("Goodbye!");
            break;
        }

        ask(&mut agent, question, streaming).await;
    }

    Ok(())
}

/// Ask one question and print the answer with its wall-clock time. Errors
/// are displayed without ending the session.
async fn ask(agent: &mut KnowledgeAgent, question: &str, streaming: bool) {
    let started = Instant::now();

    let outcome = if streaming {
        print!("Bot: ");
        let _ = std::io::stdout().flush();
        let result = agent
            .chat_streaming(question, |token| {
                print!("{token}");
                let _ = std::io::stdout().flush();
            })
            .await;
        println!();
        result.map(|_| ())
    } else {
        agent.chat(question).await.map(|answer| {
            println!("Bot: {answer}");
        })
    };

    match outcome {
        Ok(()) => println!("({:.2}s)", started.elapsed().as_secs_f64()),
        Err(err) => eprintln!("error: {err}"),
    }
}
