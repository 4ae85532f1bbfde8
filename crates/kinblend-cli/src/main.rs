use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kinblend_contracts::chat::{parse_command, Command as ChatCommand, HELP_COMMANDS};
use kinblend_contracts::events::{EventJournal, EventPayload};
use kinblend_contracts::image::Slot;
use kinblend_contracts::state::AppState;
use kinblend_engine::{
    BlendController, CredentialStore, EnvCredentials, GeminiClient, GeminiConfig, KeyPrompt,
};
use serde_json::Value;

mod render;

use render::render_view;

#[derive(Debug, Parser)]
#[command(
    name = "kinblend-rs",
    version,
    about = "Blend an adult and a child portrait into one generated image"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Session(SessionArgs),
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ProviderArgs {
    #[arg(long)]
    model: Option<String>,
    /// Abort the generation request after this many seconds.
    #[arg(long)]
    timeout_secs: Option<u64>,
    #[arg(long)]
    events: Option<PathBuf>,
}

#[derive(Debug, Parser)]
struct SessionArgs {
    #[command(flatten)]
    provider: ProviderArgs,
    /// Directory used by /download when no directory is given.
    #[arg(long, default_value = ".")]
    out: PathBuf,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    adult: PathBuf,
    #[arg(long)]
    child: PathBuf,
    #[arg(long)]
    out: PathBuf,
    #[command(flatten)]
    provider: ProviderArgs,
}

const EXIT_ERROR: i32 = 1;
const EXIT_KEY_REQUIRED: i32 = 2;

type CliController = BlendController<EnvCredentials<StdinKeyPrompt>, GeminiClient>;

struct StdinKeyPrompt;

impl KeyPrompt for StdinKeyPrompt {
    fn prompt_for_key(&mut self) -> Result<Option<String>> {
        print!("Gemini API key: ");
        io::stdout().flush()?;
        let mut line = String::new();
        let read = io::stdin()
            .read_line(&mut line)
            .context("failed reading API key from stdin")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_string()))
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("kinblend-rs error: {err:#}");
            std::process::exit(EXIT_ERROR);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Session(args) => {
            run_session(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn gemini_config(args: &ProviderArgs) -> GeminiConfig {
    let mut config = GeminiConfig::from_env();
    if let Some(model) = args
        .model
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        config.model = model.to_string();
    }
    config.timeout = args.timeout_secs.map(Duration::from_secs);
    config
}

fn build_controller(args: &ProviderArgs) -> Result<(CliController, Option<EventJournal>)> {
    let store = CredentialStore::from_env();
    let config = gemini_config(args);
    let model = config.model.clone();
    let client = GeminiClient::new(config, store.clone())?;
    let credentials = EnvCredentials::new(store, StdinKeyPrompt);
    let mut controller = BlendController::new(credentials, client);

    controller.on_transition(Box::new(|state: &AppState| {
        if state.is_generating() {
            println!("Generating blended portrait...");
        }
    }));

    let journal = args
        .events
        .as_ref()
        .map(|path| EventJournal::new(path.clone(), uuid::Uuid::new_v4().to_string()));
    if let Some(journal) = journal.clone() {
        let mut payload = EventPayload::new();
        payload.insert("model".to_string(), Value::String(model));
        journal.emit("session_started", payload)?;
        controller.on_transition(Box::new(move |state: &AppState| {
            if let Err(err) = journal.emit_state(state) {
                log::warn!("event journal write failed: {err:#}");
            }
        }));
    }
    Ok((controller, journal))
}

fn run_session(args: SessionArgs) -> Result<()> {
    let (mut controller, journal) = build_controller(&args.provider)?;
    let stdin = io::stdin();
    let mut line = String::new();

    println!("Kinblend session started. Type /help for commands.");
    controller.check_credentials();
    println!("{}", render_view(&controller.view()));

    loop {
        print!("> ");
        io::stdout().flush()?;

        line.clear();
        let read = match stdin.read_line(&mut line) {
            Ok(read) => read,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        if read == 0 {
            break;
        }

        match parse_command(&line) {
            ChatCommand::Noop => continue,
            ChatCommand::Help => {
                println!("Commands: {}", HELP_COMMANDS.join("  "));
                continue;
            }
            ChatCommand::Quit => break,
            ChatCommand::Status => {
                println!("state: {}", controller.state().kind());
            }
            ChatCommand::SelectImage { slot, path } => {
                let selected = select_into_slot(&mut controller, journal.as_ref(), slot, &path);
                if let Err(err) = selected {
                    println!("Could not load {slot} image: {err:#}");
                    continue;
                }
            }
            ChatCommand::ClearImage { slot } => {
                controller.clear_image(slot);
                journal_slot(journal.as_ref(), &controller, slot);
            }
            ChatCommand::Generate => {
                if !controller.can_generate() {
                    match controller.state() {
                        AppState::KeySelection { .. } => {
                            println!("Select an API key first (/key).")
                        }
                        AppState::Success(_) => println!("Use /reset to start a new blend."),
                        _ => println!("Select both an adult and a child image first."),
                    }
                    continue;
                }
                controller.generate();
            }
            ChatCommand::SelectKey => controller.select_key(),
            ChatCommand::CheckCredentials => {
                if controller.check_credentials() {
                    println!("API key present.");
                }
            }
            ChatCommand::Download { dir } => {
                let dir = dir.unwrap_or_else(|| args.out.clone());
                match controller.download(&dir) {
                    Ok(path) => println!("Saved {}", path.display()),
                    Err(err) => println!("Download failed: {err:#}"),
                }
                continue;
            }
            ChatCommand::Reset => controller.reset(),
            ChatCommand::Unknown { command, arg } => {
                if command.is_empty() {
                    println!("Unrecognized input '{arg}'. Type /help for commands.");
                } else {
                    println!("Unknown command /{command}. Type /help for commands.");
                }
                continue;
            }
        }
        println!("{}", render_view(&controller.view()));
    }
    Ok(())
}

fn select_into_slot(
    controller: &mut CliController,
    journal: Option<&EventJournal>,
    slot: Slot,
    path: &Path,
) -> Result<()> {
    controller.select_file(slot, path)?;
    journal_slot(journal, controller, slot);
    Ok(())
}

fn journal_slot(journal: Option<&EventJournal>, controller: &CliController, slot: Slot) {
    let Some(journal) = journal else {
        return;
    };
    if let Err(err) = journal.emit_slot(slot, controller.image(slot)) {
        log::warn!("event journal write failed: {err:#}");
    }
}

fn run_once(args: RunArgs) -> Result<i32> {
    let (mut controller, journal) = build_controller(&args.provider)?;
    select_into_slot(&mut controller, journal.as_ref(), Slot::Adult, &args.adult)?;
    select_into_slot(&mut controller, journal.as_ref(), Slot::Child, &args.child)?;

    if !controller.check_credentials() {
        controller.select_key();
        if !matches!(controller.state(), AppState::Idle) {
            println!("{}", render_view(&controller.view()));
            return Ok(EXIT_KEY_REQUIRED);
        }
    }

    controller.generate();
    println!("{}", render_view(&controller.view()));
    match controller.state() {
        AppState::Success(_) => {
            let path = controller.download(&args.out)?;
            println!("Saved {}", path.display());
            Ok(0)
        }
        AppState::KeySelection { .. } => Ok(EXIT_KEY_REQUIRED),
        _ => Ok(EXIT_ERROR),
    }
}
