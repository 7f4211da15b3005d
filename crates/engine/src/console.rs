//! Line-oriented command surface of the client.
//!
//! Lines arrive from a chat box, so they may carry the addon's `/lb `
//! prefix and stray whitespace. Every command replies with one or more
//! lines of plain text; failures are rendered together with what the user
//! can do about them.

use std::fmt::Write as _;

use thiserror::Error;

use raidsync_core::{CommandPayload, EventId, Role, SignupStatus, chunk};

use crate::Engine;
use crate::error::EngineError;

pub const PREFIX: &str = "/lb";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Import(String),
    ImportPart { index: usize, part: String },
    ImportDone,
    List,
    Remove(EventId),
    Clear,
    Reset { confirmed: bool },
    Status,
    Queue,
    SetStatus {
        event_id: EventId,
        status: SignupStatus,
        character: Option<String>,
    },
    SignUp {
        event_id: EventId,
        character: String,
        realm: String,
        class: String,
        role: Role,
        spec: String,
    },
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },

    #[error("{command}: invalid {argument} '{value}'")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },

    #[error("{command}: unexpected extra input '{rest}'")]
    TooManyArguments { command: &'static str, rest: String },
}

fn strip_prefix(line: &str) -> &str {
    match line.get(..PREFIX.len()) {
        Some(head) if head.eq_ignore_ascii_case(PREFIX) => {
            let rest = &line[PREFIX.len()..];
            if rest.is_empty() || rest.starts_with(char::is_whitespace) {
                rest.trim_start()
            } else {
                line
            }
        }
        _ => line,
    }
}

struct Args<'a> {
    command: &'static str,
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a> {
    fn new(command: &'static str, rest: &'a str) -> Self {
        Self {
            command,
            words: rest.split_whitespace(),
        }
    }

    fn next(&mut self, argument: &'static str) -> Result<&'a str, ParseError> {
        self.words.next().ok_or(ParseError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn optional(&mut self) -> Option<&'a str> {
        self.words.next()
    }

    fn event_id(&mut self) -> Result<EventId, ParseError> {
        let raw = self.next("event id")?;
        raw.parse::<i64>()
            .map(EventId::new)
            .map_err(|_| self.invalid("event id", raw))
    }

    fn invalid(&self, argument: &'static str, value: &str) -> ParseError {
        ParseError::InvalidArgument {
            command: self.command,
            argument,
            value: value.to_string(),
        }
    }

    fn finish(mut self) -> Result<(), ParseError> {
        let rest: Vec<&str> = self.words.by_ref().collect();
        if rest.is_empty() {
            Ok(())
        } else {
            Err(ParseError::TooManyArguments {
                command: self.command,
                rest: rest.join(" "),
            })
        }
    }
}

pub fn parse(line: &str) -> Result<ConsoleCommand, ParseError> {
    let line = strip_prefix(line.trim());
    if line.is_empty() {
        return Err(ParseError::Empty);
    }
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(h, r)| (h, r.trim()))
        .unwrap_or((line, ""));
    let head = head.to_ascii_lowercase();

    let command = match head.as_str() {
        chunk::IMPORT_COMMAND => {
            if rest.is_empty() {
                return Err(ParseError::MissingArgument {
                    command: "import",
                    argument: "payload",
                });
            }
            ConsoleCommand::Import(rest.to_string())
        }
        chunk::FINALIZE_COMMAND => {
            Args::new("importdone", rest).finish()?;
            ConsoleCommand::ImportDone
        }
        "list" => {
            Args::new("list", rest).finish()?;
            ConsoleCommand::List
        }
        "remove" => {
            let mut args = Args::new("remove", rest);
            let event_id = args.event_id()?;
            args.finish()?;
            ConsoleCommand::Remove(event_id)
        }
        "clear" => {
            Args::new("clear", rest).finish()?;
            ConsoleCommand::Clear
        }
        "reset" => {
            let mut args = Args::new("reset", rest);
            let confirmed = match args.optional() {
                None => false,
                Some(word) if word.eq_ignore_ascii_case("confirm") => true,
                Some(word) => return Err(args.invalid("confirmation", word)),
            };
            args.finish()?;
            ConsoleCommand::Reset { confirmed }
        }
        "status" => {
            Args::new("status", rest).finish()?;
            ConsoleCommand::Status
        }
        "queue" => {
            Args::new("queue", rest).finish()?;
            ConsoleCommand::Queue
        }
        "setstatus" => {
            let mut args = Args::new("setstatus", rest);
            let event_id = args.event_id()?;
            let raw = args.next("status")?;
            let status = SignupStatus::parse(raw).map_err(|_| args.invalid("status", raw))?;
            let character = args.optional().map(str::to_string);
            args.finish()?;
            ConsoleCommand::SetStatus {
                event_id,
                status,
                character,
            }
        }
        "signup" => {
            let mut args = Args::new("signup", rest);
            let event_id = args.event_id()?;
            let character = args.next("character")?.to_string();
            let realm = args.next("realm")?.to_string();
            let class = args.next("class")?.to_string();
            let raw = args.next("role")?;
            let role = Role::parse(raw).map_err(|_| args.invalid("role", raw))?;
            let spec = args.next("spec")?.to_string();
            args.finish()?;
            ConsoleCommand::SignUp {
                event_id,
                character,
                realm,
                class,
                role,
                spec,
            }
        }
        "help" | "?" => ConsoleCommand::Help,
        other => match other
            .strip_prefix(chunk::IMPORT_COMMAND)
            .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        {
            Some(digits) => {
                let index = digits.parse::<usize>().map_err(|_| ParseError::InvalidArgument {
                    command: "import",
                    argument: "part number",
                    value: digits.to_string(),
                })?;
                if rest.is_empty() {
                    return Err(ParseError::MissingArgument {
                        command: "import",
                        argument: "part",
                    });
                }
                ConsoleCommand::ImportPart {
                    index,
                    part: rest.to_string(),
                }
            }
            None => return Err(ParseError::Unknown(other.to_string())),
        },
    };
    Ok(command)
}

pub const HELP: &str = "\
Commands:
  import <data>             import an exported event
  import<N> <part>          stage part N of a long export
  importdone                finish a multi-part import
  list                      show stored events
  remove <id>               forget one event
  clear                     forget events dated before today
  reset                     wipe all local data (asks for confirmation)
  status                    bridge state and queue depth
  queue                     list commands waiting for the bridge
  setstatus <id> <status> [character]
  signup <id> <character> <realm> <class> <role> <spec>
  help                      this text";

/// User-facing rendering of an engine failure.
pub fn render_error(err: &EngineError) -> String {
    format!("Error: {err}. {}", err.category().hint())
}

/// Parses and runs one input line.
pub fn handle_line(engine: &mut Engine, line: &str) -> String {
    match parse(line) {
        Ok(command) => execute(engine, command),
        Err(e) => format!("{e}. Type 'help' for a list of commands."),
    }
}

pub fn execute(engine: &mut Engine, command: ConsoleCommand) -> String {
    run(engine, command).unwrap_or_else(|e| render_error(&e))
}

fn run(engine: &mut Engine, command: ConsoleCommand) -> Result<String, EngineError> {
    let reply = match command {
        ConsoleCommand::Import(payload) => {
            let snapshot = engine.import(&payload)?;
            format!("Imported event {}: {}", snapshot.event_id, snapshot.title)
        }
        ConsoleCommand::ImportPart { index, part } => {
            let report = engine.stage_chunk(index, &part)?;
            format!(
                "Staged part {index} ({} staged, highest {}). Send 'importdone' when finished.",
                report.staged, report.max_index_seen
            )
        }
        ConsoleCommand::ImportDone => {
            let snapshot = engine.finalize_import()?;
            format!("Imported event {}: {}", snapshot.event_id, snapshot.title)
        }
        ConsoleCommand::List => {
            let snapshots = engine.snapshots()?;
            if snapshots.is_empty() {
                return Ok("No events stored.".to_string());
            }
            let mut out = String::new();
            for snap in &snapshots {
                let when = format!("{} {}", snap.date, snap.time);
                let _ = writeln!(
                    out,
                    "[{}] {} {} ({} signups)",
                    snap.event_id,
                    when.trim(),
                    snap.title,
                    snap.signups.len()
                );
            }
            out.trim_end().to_string()
        }
        ConsoleCommand::Remove(event_id) => {
            if engine.remove(event_id)? {
                format!("Removed event {event_id}.")
            } else {
                format!("No event {event_id} stored.")
            }
        }
        ConsoleCommand::Clear => {
            let today = engine.today()?;
            let removed = engine.prune(&today)?;
            format!("Removed {removed} past event(s).")
        }
        ConsoleCommand::Reset { confirmed: false } => {
            "This wipes every stored event and queued command. Type 'reset confirm' to proceed."
                .to_string()
        }
        ConsoleCommand::Reset { confirmed: true } => {
            engine.reset()?;
            "Local data reset.".to_string()
        }
        ConsoleCommand::Status => {
            let liveness = engine.liveness()?;
            let queued = engine.pending_commands()?.len();
            let events = engine.snapshots()?.len();
            let mut out = format!(
                "Bridge: {liveness}. Events: {events}. Queued commands: {queued}. Last update: {}.",
                engine.last_update()?
            );
            if let Some(set) = engine.pending_import() {
                let _ = write!(out, " Import in progress: {} part(s) staged.", set.staged());
            }
            out
        }
        ConsoleCommand::Queue => {
            let pending = engine.pending_commands()?;
            if pending.is_empty() {
                return Ok("Queue is empty.".to_string());
            }
            let mut out = String::new();
            for cmd in &pending {
                let _ = writeln!(
                    out,
                    "#{} {} event {} {} -> {}",
                    cmd.id,
                    cmd.kind().as_str(),
                    cmd.event_id,
                    cmd.payload.character(),
                    cmd.payload.resulting_status()
                );
            }
            out.trim_end().to_string()
        }
        ConsoleCommand::SetStatus {
            event_id,
            status,
            character,
        } => {
            let character = match character {
                Some(c) => c,
                None if !engine.config().local_actor.is_empty() => {
                    engine.config().local_actor.clone()
                }
                None => return Ok("No character given and no local character configured.".into()),
            };
            let cmd = engine.enqueue(event_id, CommandPayload::ChangeStatus { character, status })?;
            format!("Queued command #{} for event {event_id}.", cmd.id)
        }
        ConsoleCommand::SignUp {
            event_id,
            character,
            realm,
            class,
            role,
            spec,
        } => {
            let payload = CommandPayload::SignUp {
                character,
                realm,
                class,
                role,
                spec,
            };
            let cmd = engine.enqueue(event_id, payload)?;
            format!("Queued command #{} for event {event_id}.", cmd.id)
        }
        ConsoleCommand::Help => HELP.to_string(),
    };
    Ok(reply)
}
