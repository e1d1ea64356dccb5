//! Decode-tolerant wrapper for fields the panel may double-encode.
//!
//! # Design
//! Depending on the server release, and sometimes between sibling fields of
//! one response, a structured field such as `settings` or `streamSettings`
//! arrives either as plain JSON (`{"clients":[...]}`) or as a JSON string
//! holding escaped JSON (`"{\"clients\":[...]}"`). `Adaptive<T>` accepts both
//! and always serializes the plain form: liberal on input, canonical on
//! output. The original wire form is not remembered. A `null` field decodes
//! as the inner type's default.

use std::fmt;
use std::ops::{Deref, DerefMut};

use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::value::RawValue;
use thiserror::Error;

/// Longest raw excerpt rendered in an error message.
const EXCERPT_LEN: usize = 256;

/// A field that decoded as neither its literal nor its string-wrapped form.
#[derive(Debug, Error)]
#[error("malformed field ({reason}): {}", excerpt(.raw))]
pub struct MalformedFieldError {
    /// The field's bytes exactly as they appeared on the wire.
    pub raw: Vec<u8>,
    pub reason: String,
}

fn excerpt(raw: &[u8]) -> String {
    let text = String::from_utf8_lossy(raw);
    if text.chars().count() <= EXCERPT_LEN {
        return text.into_owned();
    }
    let cut: String = text.chars().take(EXCERPT_LEN).collect();
    format!("{cut}...")
}

/// Holds exactly one `T`, decoded from either wire form.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Adaptive<T>(pub T);

impl<T> Adaptive<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned> Adaptive<T> {
    /// Decode `raw`, branching on its first significant byte: a quote means
    /// the JSON string's content is decoded as `T`, anything else is decoded
    /// as `T` directly.
    pub fn decode(raw: &[u8]) -> Result<Self, MalformedFieldError> {
        let malformed = |reason: String| MalformedFieldError {
            raw: raw.to_vec(),
            reason,
        };
        let first = raw.iter().copied().find(|b| !b.is_ascii_whitespace());
        if first == Some(b'"') {
            let inner: String =
                serde_json::from_slice(raw).map_err(|e| malformed(e.to_string()))?;
            serde_json::from_str(&inner)
                .map(Self)
                .map_err(|e| malformed(format!("string-wrapped value: {e}")))
        } else {
            serde_json::from_slice(raw)
                .map(Self)
                .map_err(|e| malformed(e.to_string()))
        }
    }
}

impl<T: Serialize> Adaptive<T> {
    /// Encode in the literal form. The string-wrapped form is never produced.
    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.0)
    }
}

impl<T> Deref for Adaptive<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T> DerefMut for Adaptive<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.0
    }
}

impl<T> From<T> for Adaptive<T> {
    fn from(value: T) -> Self {
        Self(value)
    }
}

impl<T: fmt::Debug> fmt::Debug for Adaptive<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl<T: Serialize> Serialize for Adaptive<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

// The field's exact wire text is captured as a `RawValue` and run through
// `decode`, so a malformed field reports the bytes the panel actually sent.
// `null` stands for a field the panel left unset and decodes as `T::default()`.
impl<'de, T: DeserializeOwned + Default> Deserialize<'de> for Adaptive<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Box::<RawValue>::deserialize(deserializer)?;
        if raw.get().trim() == "null" {
            return Ok(Self::default());
        }
        Self::decode(raw.get().as_bytes()).map_err(D::Error::custom)
    }
}
