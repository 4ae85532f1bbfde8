use crate::image::Slot;

#[derive(Clone, Copy, Debug)]
pub(crate) struct SlotCommandSpec {
    pub command: &'static str,
    pub slot: Slot,
}

pub(crate) const SLOT_PATH_COMMANDS: &[SlotCommandSpec] = &[
    SlotCommandSpec {
        command: "adult",
        slot: Slot::Adult,
    },
    SlotCommandSpec {
        command: "child",
        slot: Slot::Child,
    },
];

pub(crate) const CLEAR_COMMAND: &str = "clear";
pub(crate) const DOWNLOAD_COMMAND: &str = "download";

pub(crate) const NO_ARG_COMMANDS: &[&str] = &[
    "generate", "key", "check", "reset", "status", "help", "quit", "exit",
];

pub const HELP_COMMANDS: &[&str] = &[
    "/adult <path>",
    "/child <path>",
    "/clear <adult|child>",
    "/generate",
    "/key",
    "/check",
    "/download [dir]",
    "/reset",
    "/status",
    "/help",
    "/quit",
];
