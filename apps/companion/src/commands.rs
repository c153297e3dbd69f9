//! Input lines typed at the prompt, parsed into thread commands.

use std::path::PathBuf;

use shared::domain::MessageId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    Send(String),
    Edit { id: MessageId, text: String },
    File(PathBuf),
    Audio(PathBuf),
    Prompts,
    Prompt(usize),
    Clear,
    SignUp,
    SignOut,
    WhoAmI,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("unknown command '/{0}', try /help")]
    Unknown(String),
}

pub const HELP: &str = "\
Type a message and press Enter to send it.
  /edit <id> <text>   edit one of your messages and regenerate the reply
  /file <path>        upload an image or PDF for analysis
  /audio <path>       send a voice recording
  /prompts            list suggested prompts
  /prompt <n>         send suggested prompt number n
  /clear              clear the chat
  /signup, /signout   change who is signed in
  /whoami             show the signed-in student
  /quit               exit";

pub fn parse_command(line: &str) -> Result<ChatCommand, CommandError> {
    if line.trim().is_empty() {
        return Ok(ChatCommand::Empty);
    }
    let Some(rest) = line.trim_start().strip_prefix('/') else {
        return Ok(ChatCommand::Send(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest.trim_end(), ""),
    };

    match name {
        "edit" => {
            const USAGE: &str = "/edit <id> <text>";
            let (id, text) = args
                .split_once(char::is_whitespace)
                .ok_or(CommandError::Usage(USAGE))?;
            let id = id
                .trim_start_matches('#')
                .parse::<u64>()
                .map_err(|_| CommandError::Usage(USAGE))?;
            let text = text.trim();
            if text.is_empty() {
                return Err(CommandError::Usage(USAGE));
            }
            Ok(ChatCommand::Edit {
                id: MessageId(id),
                text: text.to_string(),
            })
        }
        "file" => path_arg(args, "/file <path>").map(ChatCommand::File),
        "audio" => path_arg(args, "/audio <path>").map(ChatCommand::Audio),
        "prompts" => Ok(ChatCommand::Prompts),
        "prompt" => args
            .parse::<usize>()
            .map(ChatCommand::Prompt)
            .map_err(|_| CommandError::Usage("/prompt <n>")),
        "clear" => Ok(ChatCommand::Clear),
        "signup" => Ok(ChatCommand::SignUp),
        "signout" => Ok(ChatCommand::SignOut),
        "whoami" => Ok(ChatCommand::WhoAmI),
        "help" => Ok(ChatCommand::Help),
        "quit" | "exit" => Ok(ChatCommand::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn path_arg(args: &str, usage: &'static str) -> Result<PathBuf, CommandError> {
    let path = args.trim_matches(|c| c == '"' || c == '\'');
    if path.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    Ok(PathBuf::from(path))
}
