//! Chunked transport over a length-limited channel.
//!
//! The sending side splits an encoded payload into 1-based indexed parts.
//! The receiving side stages parts into a [`ChunkSet`] and only assembles
//! them when told the import is complete.

use std::collections::BTreeMap;

use crate::codec;
use crate::error::CoreError;
use crate::ids::ImportId;
use crate::model::Snapshot;

pub const IMPORT_COMMAND: &str = "import";
pub const FINALIZE_COMMAND: &str = "importdone";

/// Highest part index a [`ChunkSet`] accepts, and the most parts
/// [`render_import_commands`] will produce.
pub const MAX_PARTS: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub part: String,
}

/// Splits `payload` into parts of at most `max_part_len` characters, numbered from 1.
pub fn split(payload: &str, max_part_len: usize) -> Result<Vec<Chunk>, CoreError> {
    if max_part_len == 0 {
        return Err(CoreError::ZeroChunkLength);
    }
    let chars: Vec<char> = payload.chars().collect();
    Ok(chars
        .chunks(max_part_len)
        .enumerate()
        .map(|(i, part)| Chunk {
            index: i + 1,
            part: part.iter().collect(),
        })
        .collect())
}

fn digit_count(mut n: usize) -> usize {
    let mut digits = 1;
    while n >= 10 {
        n /= 10;
        digits += 1;
    }
    digits
}

/// Renders the console lines that carry `snapshot` to a client, each at most
/// `max_command_len` characters: a single `import` when it fits, otherwise
/// `import1..importN` followed by `importdone`.
pub fn render_import_commands(
    snapshot: &Snapshot,
    max_command_len: usize,
) -> Result<Vec<String>, CoreError> {
    let payload = codec::encode(snapshot);
    let single = format!("{IMPORT_COMMAND} {payload}");
    if single.len() <= max_command_len {
        return Ok(vec![single]);
    }

    // Widen the index field until the part count fits in it.
    let mut index_digits = 1;
    loop {
        let overhead = IMPORT_COMMAND.len() + index_digits + 1;
        let part_len = max_command_len
            .checked_sub(overhead)
            .filter(|len| *len > 0)
            .ok_or(CoreError::ZeroChunkLength)?;
        let count = payload.len().div_ceil(part_len);
        if count > MAX_PARTS {
            return Err(CoreError::TooManyChunks {
                count,
                max: MAX_PARTS,
            });
        }
        if digit_count(count) <= index_digits {
            let mut lines: Vec<String> = split(&payload, part_len)?
                .into_iter()
                .map(|c| format!("{IMPORT_COMMAND}{} {}", c.index, c.part))
                .collect();
            lines.push(FINALIZE_COMMAND.to_string());
            return Ok(lines);
        }
        index_digits += 1;
    }
}

/// Parts of one in-progress import, keyed by index.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    import_id: ImportId,
    parts: BTreeMap<usize, String>,
    max_index_seen: usize,
}

impl Default for ChunkSet {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkSet {
    pub fn new() -> Self {
        Self {
            import_id: ImportId::new(),
            parts: BTreeMap::new(),
            max_index_seen: 0,
        }
    }

    pub fn import_id(&self) -> ImportId {
        self.import_id
    }

    /// Stages a part. A later part for the same index replaces the earlier one.
    /// Indices above [`MAX_PARTS`] are refused and leave the set unchanged.
    pub fn stage(&mut self, index: usize, part: impl Into<String>) -> Result<(), CoreError> {
        if index == 0 {
            return Err(CoreError::ZeroChunkIndex);
        }
        if index > MAX_PARTS {
            return Err(CoreError::ChunkIndexTooLarge {
                index,
                max: MAX_PARTS,
            });
        }
        self.parts.insert(index, part.into());
        self.max_index_seen = self.max_index_seen.max(index);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn staged(&self) -> usize {
        self.parts.len()
    }

    pub fn max_index_seen(&self) -> usize {
        self.max_index_seen
    }

    /// Indices below the highest one seen that were never staged.
    pub fn missing(&self) -> Vec<usize> {
        (1..=self.max_index_seen)
            .filter(|i| !self.parts.contains_key(i))
            .collect()
    }

    /// Concatenates parts `1..=max_index_seen` in index order.
    pub fn assemble(&self) -> Result<String, CoreError> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(CoreError::MissingChunks { missing });
        }
        Ok(self.parts.values().map(String::as_str).collect())
    }
}
