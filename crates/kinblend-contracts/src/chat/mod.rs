mod command_parser;
mod command_registry;

pub use command_parser::{parse_command, Command};
pub use command_registry::HELP_COMMANDS;
