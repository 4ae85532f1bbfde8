use std::path::PathBuf;

use super::command_registry::{
    CLEAR_COMMAND, DOWNLOAD_COMMAND, NO_ARG_COMMANDS, SLOT_PATH_COMMANDS,
};
use crate::image::Slot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Noop,
    SelectImage { slot: Slot, path: PathBuf },
    ClearImage { slot: Slot },
    Generate,
    SelectKey,
    CheckCredentials,
    Download { dir: Option<PathBuf> },
    Reset,
    Status,
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

fn parse_single_path_arg(arg: &str) -> Option<PathBuf> {
    let parts = parse_path_args(arg);
    if parts.is_empty() {
        return None;
    }
    Some(PathBuf::from(parts.join(" ")))
}

fn unknown(command: &str, arg: &str) -> Command {
    Command::Unknown {
        command: command.to_string(),
        arg: arg.to_string(),
    }
}

pub fn parse_command(text: &str) -> Command {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return Command::Noop;
    }

    let Some(slash_tail) = raw_trimmed.strip_prefix('/') else {
        return unknown("", raw_trimmed);
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    if let Some(spec) = SLOT_PATH_COMMANDS.iter().find(|spec| spec.command == command) {
        return match parse_single_path_arg(arg) {
            Some(path) => Command::SelectImage {
                slot: spec.slot,
                path,
            },
            None => unknown(&command, arg),
        };
    }

    if command == CLEAR_COMMAND {
        return match arg.parse::<Slot>() {
            Ok(slot) => Command::ClearImage { slot },
            Err(_) => unknown(&command, arg),
        };
    }

    if command == DOWNLOAD_COMMAND {
        return Command::Download {
            dir: parse_single_path_arg(arg),
        };
    }

    if NO_ARG_COMMANDS.contains(&command.as_str()) {
        return match command.as_str() {
            "generate" => Command::Generate,
            "key" => Command::SelectKey,
            "check" => Command::CheckCredentials,
            "reset" => Command::Reset,
            "status" => Command::Status,
            "help" => Command::Help,
            _ => Command::Quit,
        };
    }

    unknown(&command, arg)
}
