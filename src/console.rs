//! Interactive text session: one prompt per line, answers printed back

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::orchestrator::Orchestrator;

const BANNER: &str = "\nWelcome to your AI assistant.\nType your question and press Enter (\"stop\" to quit):\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Empty,
    Quit,
    Farewell,
    // Mode-switch phrases left over from the voice front-end
    Ignored,
    Prompt(String),
}

/// Lowercase and trim the line, then decide what it means
pub fn classify(line: &str) -> ConsoleInput {
    let normalized = line.trim().to_lowercase();
    match normalized.as_str() {
        "" => ConsoleInput::Empty,
        "stop" => ConsoleInput::Quit,
        "thank you for your help" => ConsoleInput::Farewell,
        "stop voice" | "stop text" => ConsoleInput::Ignored,
        _ => ConsoleInput::Prompt(normalized),
    }
}

/// Read prompts from `input` until EOF or a closing phrase
pub async fn run<R, W>(orchestrator: &Orchestrator, input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = input.lines();
    loop {
        output.write_all(BANNER.as_bytes()).await?;
        output.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match classify(&line) {
            ConsoleInput::Quit => {
                output.write_all(b"\nGoodbye!\n").await?;
                break;
            }
            ConsoleInput::Farewell => {
                output.write_all(b"You're welcome. Goodbye!\n").await?;
                break;
            }
            ConsoleInput::Empty | ConsoleInput::Ignored => continue,
            ConsoleInput::Prompt(prompt) => {
                let response = orchestrator.respond(&prompt).await;
                output.write_all(response.as_bytes()).await?;
                output.write_all(b"\n").await?;
            }
        }
    }
    output.flush().await?;
    info!("console session ended");
    Ok(())
}
