use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CodecError;
use crate::ids::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Tank,
    Healer,
    Dps,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tank => "tank",
            Self::Healer => "healer",
            Self::Dps => "dps",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodecError> {
        match s.to_ascii_lowercase().as_str() {
            "tank" => Ok(Self::Tank),
            "healer" => Ok(Self::Healer),
            "dps" => Ok(Self::Dps),
            _ => Err(CodecError::invalid(format!("unknown role: {s}"))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignupStatus {
    Signed,
    Late,
    Tentative,
    Benched,
    Absent,
}

impl SignupStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Signed => "signed",
            Self::Late => "late",
            Self::Tentative => "tentative",
            Self::Benched => "benched",
            Self::Absent => "absent",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CodecError> {
        match s.to_ascii_lowercase().as_str() {
            "signed" => Ok(Self::Signed),
            "late" => Ok(Self::Late),
            "tentative" => Ok(Self::Tentative),
            "benched" => Ok(Self::Benched),
            "absent" => Ok(Self::Absent),
            _ => Err(CodecError::invalid(format!("unknown status: {s}"))),
        }
    }
}

impl fmt::Display for SignupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signup {
    pub character: String,
    pub realm: String,
    pub class: String,
    pub role: Role,
    pub spec: String,
    pub status: SignupStatus,
}

/// Complete point-in-time view of one event and its signups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub event_id: EventId,
    pub title: String,
    /// `YYYY-MM-DD`, empty when unscheduled.
    pub date: String,
    /// `HH:MM:SS`, empty when unscheduled.
    pub time: String,
    pub owner: String,
    pub log_url: Option<String>,
    pub signups: Vec<Signup>,
}

impl Snapshot {
    pub fn new(event_id: EventId, title: impl Into<String>) -> Self {
        Self {
            event_id,
            title: title.into(),
            date: String::new(),
            time: String::new(),
            owner: String::new(),
            log_url: None,
            signups: Vec::new(),
        }
    }

    /// Display order of the store: by date, then time, then id.
    pub fn sort_key(&self) -> (&str, &str, EventId) {
        (&self.date, &self.time, self.event_id)
    }

    pub fn signup_for(&self, character: &str) -> Option<&Signup> {
        self.signups
            .iter()
            .find(|s| same_character(&s.character, character))
    }

    pub fn is_owned_by(&self, character: &str) -> bool {
        !self.owner.is_empty() && same_character(&self.owner, character)
    }
}

/// Character names compare case-insensitively.
pub fn same_character(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandKind {
    ChangeStatus,
    SignUp,
}

impl CommandKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ChangeStatus => "changeStatus",
            Self::SignUp => "signUp",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommandPayload {
    ChangeStatus {
        character: String,
        status: SignupStatus,
    },
    SignUp {
        character: String,
        realm: String,
        class: String,
        role: Role,
        spec: String,
    },
}

impl CommandPayload {
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::ChangeStatus { .. } => CommandKind::ChangeStatus,
            Self::SignUp { .. } => CommandKind::SignUp,
        }
    }

    pub fn character(&self) -> &str {
        match self {
            Self::ChangeStatus { character, .. } | Self::SignUp { character, .. } => character,
        }
    }

    /// The status the target ends up with once the command is applied upstream.
    pub fn resulting_status(&self) -> SignupStatus {
        match self {
            Self::ChangeStatus { status, .. } => *status,
            Self::SignUp { .. } => SignupStatus::Signed,
        }
    }

    pub fn to_msgpack(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec(self)
    }

    pub fn from_msgpack(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub id: CommandId,
    pub event_id: EventId,
    pub timestamp: Timestamp,
    pub payload: CommandPayload,
}

impl Command {
    pub fn kind(&self) -> CommandKind {
        self.payload.kind()
    }
}

/// What the bridge last wrote into the shared location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeRecord {
    pub heartbeat: Timestamp,
    pub last_update: Timestamp,
    pub events: Vec<Snapshot>,
}
