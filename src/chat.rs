//! Interactive chat loop.
//!
//! Plain lines are sent as messages; lines starting with `/` are commands.
//! Ctrl-C while a reply is streaming cancels that send; at the prompt it exits.

use std::future::Future;
use std::io::{self, Write};

use anyhow::Result;
use mirai_client::{HistoryDirectory, SessionController};
use mirai_core::{ConversationId, SendOutcome};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};

use crate::render::{self, StreamPrinter};

const HELP: &str = "\
Commands:
  /new              start a new conversation
  /new --server     start a new conversation saved on the server right away
  /history          list past conversations
  /open <id>        open a past conversation
  /rename <title>   rename the current conversation
  /delete <id>      delete a conversation
  /health           check the backend
  /quit             exit";

#[derive(Debug, PartialEq, Eq)]
enum Input {
    Message(String),
    New { server: bool },
    History,
    Open(ConversationId),
    Rename(String),
    Delete(ConversationId),
    Health,
    Help,
    Quit,
    Invalid(String),
}

fn parse_input(line: &str) -> Input {
    let line = line.trim();
    let Some(command) = line.strip_prefix('/') else {
        return Input::Message(line.to_string());
    };
    let (name, arg) = match command.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (command, ""),
    };
    match name {
        "new" => match arg {
            "" => Input::New { server: false },
            "--server" => Input::New { server: true },
            _ => Input::Invalid("usage: /new [--server]".to_string()),
        },
        "history" => Input::History,
        "open" | "delete" => match arg.parse().ok().and_then(ConversationId::new) {
            Some(id) if name == "open" => Input::Open(id),
            Some(id) => Input::Delete(id),
            None => Input::Invalid(format!("/{name} needs a positive conversation id")),
        },
        "rename" if !arg.is_empty() => Input::Rename(arg.to_string()),
        "rename" => Input::Invalid("/rename needs a title".to_string()),
        "health" => Input::Health,
        "help" => Input::Help,
        "quit" | "exit" => Input::Quit,
        other => Input::Invalid(format!("unknown command /{other}, try /help")),
    }
}

pub async fn run(controller: SessionController) -> Result<()> {
    let directory = HistoryDirectory::new(controller.backend().clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = io::stdout();

    writeln!(stdout, "{}  (/help for commands)", controller.state().display_title())?;
    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let Some(line) = next_line(&mut lines, interrupted()).await? else {
            writeln!(stdout)?;
            break;
        };

        match parse_input(&line) {
            Input::Message(text) => {
                if text.is_empty() {
                    continue;
                }
                controller.set_input(text);
                let outcome = stream_reply(&controller, &mut stdout).await?;
                if outcome == SendOutcome::Cancelled {
                    writeln!(stdout, "[cancelled]")?;
                }
            }
            Input::New { server: false } => {
                controller.reset();
                writeln!(stdout, "Started a new conversation.")?;
            }
            Input::New { server: true } => match controller.create_conversation().await {
                Ok(id) => writeln!(stdout, "Started conversation {id}.")?,
                Err(e) => writeln!(stdout, "Could not create conversation: {e}")?,
            },
            Input::History => match directory.list().await {
                Ok(entries) => render::write_history(&mut stdout, &entries)?,
                Err(e) => writeln!(stdout, "Could not load history: {e}")?,
            },
            Input::Open(id) => match controller.load_conversation(id).await {
                Ok(()) => render::write_transcript(&mut stdout, &controller.state())?,
                Err(e) => writeln!(stdout, "Could not open conversation {id}: {e}")?,
            },
            Input::Rename(title) => match controller.rename(&title).await {
                Ok(()) => writeln!(stdout, "Renamed to {}.", controller.state().display_title())?,
                Err(e) => writeln!(stdout, "Could not rename: {e}")?,
            },
            Input::Delete(id) => match controller.backend().delete_conversation(id).await {
                Ok(()) => {
                    if controller.state().conversation_id == Some(id) {
                        controller.reset();
                    }
                    writeln!(stdout, "Deleted conversation {id}.")?;
                }
                Err(e) => writeln!(stdout, "Could not delete conversation {id}: {e}")?,
            },
            Input::Health => match controller.backend().health().await {
                Ok(report) => writeln!(stdout, "Server: {}", report.status.as_str())?,
                Err(e) => writeln!(stdout, "Server: unreachable ({e})")?,
            },
            Input::Help => writeln!(stdout, "{HELP}")?,
            Input::Quit => break,
            Input::Invalid(reason) => writeln!(stdout, "{reason}")?,
        }
    }
    Ok(())
}

/// Next input line, or `None` on end of input or when `interrupt` fires first.
async fn next_line<R, F>(lines: &mut Lines<R>, interrupt: F) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
    F: Future<Output = ()>,
{
    tokio::select! {
        line = lines.next_line() => line,
        () = interrupt => Ok(None),
    }
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn interrupted() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Submit the composer and print the reply as it streams.
async fn stream_reply<W: Write>(controller: &SessionController, out: &mut W) -> Result<SendOutcome> {
    let mut updates = controller.subscribe();
    let mut printer = StreamPrinter::new(controller.state().messages.len());
    let send = controller.submit();
    tokio::pin!(send);

    let outcome = loop {
        tokio::select! {
            outcome = &mut send => break outcome,
            changed = updates.changed() => {
                if changed.is_ok() {
                    let state = updates.borrow_and_update().clone();
                    printer.render(out, &state)?;
                }
            }
            () = interrupted() => {
                let _ = controller.cancel();
            }
        }
    };

    printer.render(out, &controller.state())?;
    printer.finish(out)?;
    Ok(outcome)
}
