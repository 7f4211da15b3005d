//! Snapshot <-> transport text.
//!
//! `encode` renders a snapshot as a structured document and maps its bytes
//! through the transport alphabet. `decode` reverses that and validates the
//! result into a typed [`Snapshot`]; it either returns a complete snapshot or
//! an error, never a partial one.

use crate::document::{self, DocValue};
use crate::error::CodecError;
use crate::ids::EventId;
use crate::model::{Role, Signup, SignupStatus, Snapshot};
use crate::transport;

pub fn encode(snapshot: &Snapshot) -> String {
    transport::encode(render_snapshot(snapshot).as_bytes())
}

pub fn decode(input: &str) -> Result<Snapshot, CodecError> {
    let bytes = transport::decode(input)?;
    let text = String::from_utf8(bytes)
        .map_err(|_| CodecError::InvalidEncoding("payload is not UTF-8 text".into()))?;
    parse_snapshot(&text)
}

/// The plain document form of a snapshot, before transport encoding.
pub fn render_snapshot(snapshot: &Snapshot) -> String {
    document::render(&snapshot_to_doc(snapshot))
}

/// Parses and validates a plain (not transport-encoded) document.
pub fn parse_snapshot(text: &str) -> Result<Snapshot, CodecError> {
    let tree = document::parse(text)?;
    snapshot_from_doc(&tree)
}

pub fn snapshot_to_doc(snapshot: &Snapshot) -> DocValue {
    let mut members = vec![
        ("id".to_string(), DocValue::Integer(snapshot.event_id.get())),
        ("title".to_string(), DocValue::Text(snapshot.title.clone())),
        ("date".to_string(), DocValue::Text(snapshot.date.clone())),
        ("time".to_string(), DocValue::Text(snapshot.time.clone())),
        ("createdBy".to_string(), DocValue::Text(snapshot.owner.clone())),
    ];
    if let Some(url) = &snapshot.log_url {
        members.push(("logUrl".to_string(), DocValue::Text(url.clone())));
    }
    let signups = snapshot.signups.iter().map(signup_to_doc).collect();
    members.push(("signups".to_string(), DocValue::Array(signups)));
    DocValue::Object(members)
}

fn signup_to_doc(signup: &Signup) -> DocValue {
    DocValue::Object(vec![
        ("character".to_string(), DocValue::Text(signup.character.clone())),
        ("realm".to_string(), DocValue::Text(signup.realm.clone())),
        ("class".to_string(), DocValue::Text(signup.class.clone())),
        ("role".to_string(), DocValue::Text(signup.role.as_str().to_string())),
        ("spec".to_string(), DocValue::Text(signup.spec.clone())),
        ("status".to_string(), DocValue::Text(signup.status.as_str().to_string())),
    ])
}

pub fn snapshot_from_doc(doc: &DocValue) -> Result<Snapshot, CodecError> {
    if !matches!(doc, DocValue::Object(_)) {
        return Err(CodecError::invalid(format!(
            "document root must be an object, found {}",
            doc.type_name()
        )));
    }

    let event_id = match doc.get("id") {
        None | Some(DocValue::Null) => return Err(CodecError::invalid("missing required field: id")),
        Some(v) => v
            .as_integer()
            .map(EventId::new)
            .ok_or_else(|| CodecError::invalid("id must be an integer"))?,
    };
    let title = match doc.get("title") {
        None | Some(DocValue::Null) => {
            return Err(CodecError::invalid("missing required field: title"));
        }
        Some(v) => v
            .as_text()
            .ok_or_else(|| CodecError::invalid("title must be a string"))?
            .to_string(),
    };

    let log_url = match doc.get("logUrl") {
        None | Some(DocValue::Null) => None,
        Some(v) => Some(
            v.as_text()
                .ok_or_else(|| CodecError::invalid("logUrl must be a string"))?
                .to_string(),
        ),
    };

    let signups = match doc.get("signups") {
        None | Some(DocValue::Null) => Vec::new(),
        Some(DocValue::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| signup_from_doc(i, item))
            .collect::<Result<Vec<_>, _>>()?,
        Some(other) => {
            return Err(CodecError::invalid(format!(
                "signups must be an array, found {}",
                other.type_name()
            )));
        }
    };

    Ok(Snapshot {
        event_id,
        title,
        date: optional_text(doc, "date")?,
        time: optional_text(doc, "time")?,
        owner: optional_text(doc, "createdBy")?,
        log_url,
        signups,
    })
}

fn signup_from_doc(index: usize, doc: &DocValue) -> Result<Signup, CodecError> {
    if !matches!(doc, DocValue::Object(_)) {
        return Err(CodecError::invalid(format!("signups[{index}] must be an object")));
    }
    let character = match doc.get("character").filter(|v| !v.is_null()) {
        Some(v) => Some(v),
        None => doc.get("name").filter(|v| !v.is_null()),
    }
    .ok_or_else(|| CodecError::invalid(format!("signups[{index}] has no character")))?
    .as_text()
    .ok_or_else(|| CodecError::invalid(format!("signups[{index}].character must be a string")))?
    .to_string();

    let role = match doc.get("role").and_then(DocValue::as_text) {
        None | Some("") => Role::Dps,
        Some(s) => Role::parse(s)?,
    };
    let status = match doc.get("status").and_then(DocValue::as_text) {
        None | Some("") => SignupStatus::Signed,
        Some(s) => SignupStatus::parse(s)?,
    };

    Ok(Signup {
        character,
        realm: optional_text(doc, "realm")?,
        class: optional_text(doc, "class")?,
        role,
        spec: optional_text(doc, "spec")?,
        status,
    })
}

fn optional_text(doc: &DocValue, key: &str) -> Result<String, CodecError> {
    match doc.get(key) {
        None | Some(DocValue::Null) => Ok(String::new()),
        Some(DocValue::Text(s)) => Ok(s.clone()),
        Some(other) => Err(CodecError::invalid(format!(
            "{key} must be a string, found {}",
            other.type_name()
        ))),
    }
}
