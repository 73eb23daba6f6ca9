//! Slash commands for interactive mode

use std::path::PathBuf;

/// Result of parsing a slash command
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// Show a message to the user (not sent to the assistant)
    Message(String),
    /// Describe an image file
    Attach(PathBuf),
    /// Print the conversation so far
    History,
    /// List saved chats
    Chats,
    /// Request a payment confirmation code
    Pay,
    /// Confirm the payment with the received code
    Confirm(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse a slash command. `None` if the input is a normal message.
pub fn execute_command(input: &str) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let (command, args) = match rest.split_once(' ') {
        Some((command, args)) => (command.to_lowercase(), args.trim()),
        None => (rest.to_lowercase(), ""),
    };

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "attach" | "a" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /attach <image path>".to_string())
            } else {
                CommandResult::Attach(PathBuf::from(args))
            }
        }

        "history" => CommandResult::History,

        "chats" => CommandResult::Chats,

        "pay" => CommandResult::Pay,

        "confirm" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /confirm <code>".to_string())
            } else {
                CommandResult::Confirm(args.to_string())
            }
        }

        "quit" | "exit" | "q" => CommandResult::Exit,

        _ => CommandResult::Unknown(command),
    })
}

/// MIME type for an image path, by extension
pub fn image_mime_type(path: &std::path::Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /attach, /a <path>     Describe the books in an image; the answer feeds your next message
  /history               Show the conversation so far
  /chats                 List saved chats (needs user_id in config)
  /pay                   Send a confirmation code for your booking
  /confirm <code>        Complete the purchase with the code
  /quit, /exit, /q       Exit tern

Examples:
  /attach ~/shelf.jpg    List the books on your shelf
  Find me a flight to the city in my favourite book"#
        .to_string()
}
