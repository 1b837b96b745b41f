//! Terminal rendering of a run.
//!
//! ```text
//! ---------- TextMessage (user) ----------
//! Who was the Miami Heat player with the highest points ...
//! ---------- ToolCallRequestEvent (WebSearchAgent) ----------
//! search_web_tool({"query":"Miami Heat 2006-2007 points"})
//! ```

use crate::groupchat::event::{EventHandler, TeamEvent};
use async_trait::async_trait;
use std::error::Error;
use std::io::{self, Write};
use std::sync::Mutex;

/// Writes every appended message, and the stop reason, to a writer (stdout by default).
pub struct ConsoleRenderer {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::with_writer(Box::new(io::stdout()))
    }

    pub fn with_writer(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }
}

impl Default for ConsoleRenderer {
    fn default() -> Self {
        Self::new()
    }
}

/// Text block for an event, or `None` for events the console does not show.
pub fn render_event(event: &TeamEvent) -> Option<String> {
    match event {
        TeamEvent::MessageAppended(message) => Some(format!(
            "---------- {} ({}) ----------\n{}\n",
            message.kind(),
            message.sender,
            message.text()
        )),
        TeamEvent::TurnFailed {
            turn,
            error,
            will_retry: true,
            ..
        } => Some(format!("[turn {} failed, retrying: {}]\n", turn, error)),
        TeamEvent::Terminated {
            stop_reason,
            message_count,
            turns,
        } => Some(format!(
            "---------- Terminated ----------\n{} ({} messages, {} turns)\n",
            stop_reason, message_count, turns
        )),
        _ => None,
    }
}

#[async_trait]
impl EventHandler for ConsoleRenderer {
    async fn on_team_event(&self, event: &TeamEvent) -> Result<(), Box<dyn Error + Send + Sync>> {
        let text = match render_event(event) {
            Some(text) => text,
            None => return Ok(()),
        };
        let mut out = self
            .out
            .lock()
            .map_err(|_| "console writer poisoned by an earlier panic")?;
        out.write_all(text.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groupchat::message::{ChatMessage, MessageContent, Sender};
    use crate::groupchat::team::StopReason;
    use crate::groupchat::termination::StopSignal;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn renders_messages_and_stop_reason() {
        let buffer = Buffer::default();
        let console = ConsoleRenderer::with_writer(Box::new(buffer.clone()));

        let message = ChatMessage {
            sequence_number: 1,
            sender: Sender::User,
            content: MessageContent::Text("find X".into()),
        };
        console
            .on_team_event(&TeamEvent::MessageAppended(message))
            .await
            .unwrap();
        console
            .on_team_event(&TeamEvent::SpeakerSelected {
                turn: 1,
                agent: "planner".into(),
            })
            .await
            .unwrap();
        console
            .on_team_event(&TeamEvent::Terminated {
                stop_reason: StopReason::ConditionMet(StopSignal::new(
                    "MaxMessagesTermination",
                    "limit",
                )),
                message_count: 1,
                turns: 0,
            })
            .await
            .unwrap();

        let text = String::from_utf8(buffer.0.lock().unwrap().clone()).unwrap();
        assert_eq!(
            text,
            "---------- TextMessage (user) ----------\nfind X\n\
             ---------- Terminated ----------\nMaxMessagesTermination: limit (1 messages, 0 turns)\n"
        );
    }
}
