//! Terminal rendering of conversation state.

use std::collections::HashMap;
use std::io::{self, Write};

use mirai_core::{ConversationState, HistoryEntry, MessageId, Role};

/// Prints assistant output incrementally while a send is streaming.
///
/// Only messages after `baseline` are considered, and user messages are
/// skipped because the user just typed them.
pub struct StreamPrinter {
    baseline: usize,
    printed: HashMap<MessageId, usize>,
    current: Option<MessageId>,
}

impl StreamPrinter {
    pub fn new(baseline: usize) -> Self {
        Self {
            baseline,
            printed: HashMap::new(),
            current: None,
        }
    }

    pub fn render<W: Write>(&mut self, out: &mut W, state: &ConversationState) -> io::Result<()> {
        for message in state.messages.iter().skip(self.baseline) {
            if message.role == Role::User {
                continue;
            }
            let done = self.printed.entry(message.id.clone()).or_insert(0);
            if *done >= message.content.len() {
                continue;
            }
            if self.current.as_ref() != Some(&message.id) {
                if self.current.is_some() {
                    writeln!(out)?;
                }
                self.current = Some(message.id.clone());
            }
            out.write_all(&message.content.as_bytes()[*done..])?;
            *done = message.content.len();
        }
        out.flush()
    }

    /// End the current line if anything was printed.
    pub fn finish<W: Write>(&mut self, out: &mut W) -> io::Result<()> {
        if self.current.take().is_some() {
            writeln!(out)?;
        }
        out.flush()
    }
}

pub fn write_transcript<W: Write>(out: &mut W, state: &ConversationState) -> io::Result<()> {
    writeln!(out, "== {} ==", state.display_title())?;
    for message in &state.messages {
        writeln!(out, "{}: {}", message.role, message.content)?;
    }
    Ok(())
}

pub fn write_history<W: Write>(out: &mut W, entries: &[HistoryEntry]) -> io::Result<()> {
    if entries.is_empty() {
        return writeln!(out, "No conversations yet.");
    }
    for entry in entries {
        writeln!(
            out,
            "#{:<5} {}  ({} messages, updated {})",
            entry.id.get(),
            entry.label(),
            entry.message_count,
            entry.updated_at.format("%Y-%m-%d %H:%M")
        )?;
    }
    Ok(())
}
