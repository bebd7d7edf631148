use chrono::{DateTime, Utc};
use futures::StreamExt;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use uuid::Uuid;

use crate::error::Result;
use crate::llm::{ChatMessage, LanguageModel};

/// Explicitly threaded conversation state: created at session start,
/// extended one exchange at a time, discarded at session end. Nothing is
/// accumulated process-wide.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    messages: Vec<ChatMessage>,
}

impl ChatSession {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            messages: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(content));
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one exchange: record the user turn, stream the reply token by token
/// into `sink` as it arrives, and record the full reply into the session.
pub async fn exchange<W: Write>(
    model: &dyn LanguageModel,
    session: &mut ChatSession,
    prompt: &str,
    sink: &mut W,
) -> Result<String> {
    session.push_user(prompt);

    let mut stream = model.chat_stream(session.messages()).await?;
    let mut reply = String::new();

    while let Some(token) = stream.next().await {
        let token = token?;
        write!(sink, "{}", token).map_err(|e| format!("Failed to write token: {}", e))?;
        sink.flush().map_err(|e| format!("Failed to flush output: {}", e))?;
        reply.push_str(&token);
    }
    writeln!(sink).map_err(|e| format!("Failed to write newline: {}", e))?;

    session.push_assistant(reply.clone());
    Ok(reply)
}

/// Line-based REPL over stdin/stdout. Ends on EOF or "exit"/"quit".
pub async fn run_repl(model: &dyn LanguageModel) -> Result<()> {
    let mut session = ChatSession::new();
    info!("Chat session {} started", session.id);

    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    let mut stdout = std::io::stdout();

    prompt_for_input(&mut stdout)?;
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            prompt_for_input(&mut stdout)?;
            continue;
        }
        if input == "exit" || input == "quit" {
            break;
        }

        exchange(model, &mut session, input, &mut stdout).await?;
        prompt_for_input(&mut stdout)?;
    }

    info!(
        "Chat session {} ended after {} messages",
        session.id,
        session.messages().len()
    );
    Ok(())
}

fn prompt_for_input(stdout: &mut std::io::Stdout) -> Result<()> {
    write!(stdout, "Ready for your request: ")
        .and_then(|_| stdout.flush())
        .map_err(|e| format!("Failed to write prompt: {}", e))?;
    Ok(())
}
