use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{JournalError, JournalResult};

/// A unit of work flowing through the bus.
///
/// The header carries delivery metadata (see [`crate::headers`]); key and body
/// are opaque bytes and travel as base64 strings in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(default)]
    pub header: HashMap<String, String>,
    #[serde(default, with = "base64_bytes")]
    pub key: Vec<u8>,
    #[serde(default, with = "base64_bytes")]
    pub body: Vec<u8>,
}

impl Event {
    pub fn new(key: impl Into<Vec<u8>>, body: impl Into<Vec<u8>>) -> Self {
        Self {
            header: HashMap::new(),
            key: key.into(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.insert(name.into(), value.into());
        self
    }

    /// Encode for the journal: `b64(key),{b64(name);b64(value);;}*,b64(body)`.
    pub fn to_log_string(&self) -> String {
        let mut pairs: Vec<(&String, &String)> = self.header.iter().collect();
        pairs.sort();

        let mut header = String::new();
        for (name, value) in pairs {
            header.push_str(&STANDARD.encode(name));
            header.push(';');
            header.push_str(&STANDARD.encode(value));
            header.push_str(";;");
        }

        format!(
            "{},{},{}",
            STANDARD.encode(&self.key),
            header,
            STANDARD.encode(&self.body)
        )
    }

    pub fn from_log_string(raw: &str) -> JournalResult<Self> {
        let mut parts = raw.split(',');
        let (Some(key), Some(header), Some(body), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(JournalError::Malformed(format!(
                "event must have 3 comma separated parts: {raw}"
            )));
        };

        let mut map = HashMap::new();
        for pair in header.split(";;").filter(|p| !p.is_empty()) {
            let Some((name, value)) = pair.split_once(';') else {
                return Err(JournalError::Malformed(format!("bad header pair: {pair}")));
            };
            map.insert(decode_text(name)?, decode_text(value)?);
        }

        Ok(Self {
            header: map,
            key: decode(key)?,
            body: decode(body)?,
        })
    }
}

fn decode(raw: &str) -> JournalResult<Vec<u8>> {
    STANDARD
        .decode(raw)
        .map_err(|e| JournalError::Malformed(format!("invalid base64: {e}")))
}

fn decode_text(raw: &str) -> JournalResult<String> {
    String::from_utf8(decode(raw)?)
        .map_err(|e| JournalError::Malformed(format!("header is not utf-8: {e}")))
}

/// The result of a poll or peek as returned to clients.
/// Peeks carry the nil id because they create no delivery record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolledEvent {
    pub id: Uuid,
    pub event: Event,
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        match Option::<String>::deserialize(deserializer)? {
            Some(raw) => STANDARD.decode(raw).map_err(serde::de::Error::custom),
            None => Ok(Vec::new()),
        }
    }
}
