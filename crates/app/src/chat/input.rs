/// One user action read from the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputCommand {
    Submit(String),
    Clear,
    Stop,
    Models,
    Status,
    Help,
    Quit,
    Unknown(String),
}

impl InputCommand {
    /// Commands that stay usable while a response is streaming.
    pub fn allowed_while_streaming(&self) -> bool {
        matches!(self, Self::Stop | Self::Quit | Self::Status | Self::Help)
    }
}

pub const HELP_TEXT: &str = "\
/clear   start a new conversation
/stop    cancel the response being streamed (also Ctrl-C)
/models  list models available to this key
/status  show conversation and connection status
/help    show this help
/quit    exit (also Ctrl-D)

End a line with \\ to continue the message on the next line.";

fn parse_command(text: &str) -> InputCommand {
    let name = text.split_whitespace().next().unwrap_or_default();
    match name.to_ascii_lowercase().as_str() {
        "/clear" | "/new" => InputCommand::Clear,
        "/stop" => InputCommand::Stop,
        "/models" => InputCommand::Models,
        "/status" => InputCommand::Status,
        "/help" | "/?" => InputCommand::Help,
        "/quit" | "/exit" => InputCommand::Quit,
        _ => InputCommand::Unknown(name.to_string()),
    }
}

/// Collects physical lines into messages.
///
/// A trailing backslash keeps the message open, which is how a multi-line
/// message is typed at a line prompt. Commands are only recognized on the
/// first line of a message.
#[derive(Debug, Default)]
pub struct MessageInput {
    pending: Vec<String>,
}

impl MessageInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_continuing(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Feeds one line. Returns `None` while a message is still open or when
    /// the finished message is blank.
    pub fn push_line(&mut self, line: &str) -> Option<InputCommand> {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(open) = line.strip_suffix('\\') {
            self.pending.push(open.to_string());
            return None;
        }

        let first_line = !self.is_continuing();
        self.pending.push(line.to_string());
        let content = std::mem::take(&mut self.pending).join("\n");
        let trimmed = content.trim();

        if trimmed.is_empty() {
            return None;
        }
        if first_line && trimmed.starts_with('/') {
            return Some(parse_command(trimmed));
        }

        Some(InputCommand::Submit(trimmed.to_string()))
    }
}
