//! Batched write commands.
//!
//! A [`Pipeline`] collects writes that must travel to the store together, in
//! one round-trip. Record saves and deletes are always issued this way so a
//! crash between two network calls cannot leave half a record behind.

use crate::traits::HashEntry;

/// One write queued in a [`Pipeline`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Merge `fields` into the hash at `key`.
    HashSet { key: String, fields: HashEntry },
    /// Replace the string at `key`.
    StringSet { key: String, value: Vec<u8> },
    /// Append to the string at `key`, creating it if absent.
    StringAppend { key: String, value: Vec<u8> },
    /// Remove every listed key.
    Delete { keys: Vec<String> },
}

impl Command {
    /// Keys this command writes.
    pub fn keys(&self) -> Vec<&str> {
        match self {
            Self::HashSet { key, .. }
            | Self::StringSet { key, .. }
            | Self::StringAppend { key, .. } => vec![key.as_str()],
            Self::Delete { keys } => keys.iter().map(String::as_str).collect(),
        }
    }
}

/// Result of one pipelined command, in queue order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reply {
    /// The write was applied.
    Ok,
    /// Length of the string after an append.
    Length(usize),
    /// Number of keys removed by a delete.
    Deleted(usize),
}

/// An ordered batch of writes executed in one round-trip.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Pipeline {
    commands: Vec<Command>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hash_set(&mut self, key: impl Into<String>, fields: HashEntry) -> &mut Self {
        self.commands.push(Command::HashSet {
            key: key.into(),
            fields,
        });
        self
    }

    pub fn string_set(&mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> &mut Self {
        self.commands.push(Command::StringSet {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn string_append(
        &mut self,
        key: impl Into<String>,
        value: impl Into<Vec<u8>>,
    ) -> &mut Self {
        self.commands.push(Command::StringAppend {
            key: key.into(),
            value: value.into(),
        });
        self
    }

    pub fn delete<I, K>(&mut self, keys: I) -> &mut Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.commands.push(Command::Delete {
            keys: keys.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Number of queued commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}
