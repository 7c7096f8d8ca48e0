//! Wire protocol shared by the chat server and its front ends.
//!
//! Every datagram is a UTF-8 text line of the form `<command>$<content>`.
//! Replies from the server are plain text lines with no envelope.

pub const DEFAULT_SERVER_PORT: u16 = 12000;
pub const ADMIN_PORT: u16 = 6666;
pub const BUFFER_SIZE: usize = 1024;
pub const MAX_NAME_LEN: usize = 64;
pub const MAX_MUTED: usize = 16;

/// Probe sent by the server to a client that has gone quiet.
pub const PING_MESSAGE: &str = "ping$";
/// Reply a client sends back after receiving a probe.
pub const PING_REPLY: &str = "ret-ping$";

/// Commands understood by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Connect,
    Say,
    SayTo,
    Disconnect,
    Rename,
    Mute,
    Unmute,
    Kick,
    RetPing,
}

impl Command {
    /// Looks up a command token. `connect` is accepted as an alias of `conn`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "conn" | "connect" => Some(Command::Connect),
            "say" => Some(Command::Say),
            "sayto" => Some(Command::SayTo),
            "disconn" => Some(Command::Disconnect),
            "rename" => Some(Command::Rename),
            "mute" => Some(Command::Mute),
            "unmute" => Some(Command::Unmute),
            "kick" => Some(Command::Kick),
            "ret-ping" => Some(Command::RetPing),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "conn",
            Command::Say => "say",
            Command::SayTo => "sayto",
            Command::Disconnect => "disconn",
            Command::Rename => "rename",
            Command::Mute => "mute",
            Command::Unmute => "unmute",
            Command::Kick => "kick",
            Command::RetPing => "ret-ping",
        }
    }
}

/// A parsed inbound request borrowing from the raw line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    pub command: &'a str,
    pub content: &'a str,
}

/// Splits a raw request line into its command and content.
///
/// A single trailing newline is stripped, the line is split on the first `$`,
/// and leading spaces are trimmed from the content. Returns `None` when the
/// command part is empty.
pub fn parse_request(line: &str) -> Option<Request<'_>> {
    let line = line.strip_suffix('\n').unwrap_or(line);

    let (command, content) = match line.split_once('$') {
        Some((command, content)) => (command, content),
        None => (line, ""),
    };

    if command.is_empty() {
        return None;
    }

    Some(Request {
        command,
        content: content.trim_start_matches(' '),
    })
}

/// Decodes a received datagram into text, dropping NUL padding.
pub fn decode_datagram(bytes: &[u8]) -> String {
    let end = bytes
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Builds a request line for the given command.
pub fn format_request(command: Command, content: &str) -> String {
    format!("{}${}", command.as_str(), content)
}

/// Truncates `text` to at most `max` bytes without splitting a character.
pub fn truncate_utf8(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Bounds a display name the way the server stores it.
pub fn bounded_name(name: &str) -> String {
    truncate_utf8(name, MAX_NAME_LEN - 1).to_string()
}

pub fn greeting(name: &str) -> String {
    format!("Hi {}, you have successfully connected to the chat", name)
}

pub fn chat_line(sender: &str, message: &str) -> String {
    format!("{}: {}", sender, message)
}

pub fn goodbye(name: &str) -> String {
    format!("Disconnected. Bye! ({})", name)
}

pub fn renamed(name: &str) -> String {
    format!("You are now known as {}", name)
}

pub fn invalid_command(command: &str) -> String {
    format!("Invalid command: {}", command)
}

pub fn kicked_announcement(name: &str) -> String {
    format!("{} has been removed from the chat", name)
}

pub fn inactivity_announcement(name: &str) -> String {
    format!("{} has been removed due to inactivity", name)
}

pub const KICK_UNAUTHORIZED: &str = "You are not authorized to kick users.";
pub const KICK_NOTICE: &str = "You have been removed from the chat";
