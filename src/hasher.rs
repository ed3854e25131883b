//! Identifier derivation for throttle records.

use crate::context::Context;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Strings up to this many characters are used verbatim as identifiers.
pub const MAX_DIRECT_KEY_LEN: usize = 40;

/// Which part of a context identifies the throttled operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// A single field of a composite context
    Field(String),
    /// A projection of a composite context onto several fields
    Fields(Vec<String>),
}

impl From<&str> for KeySpec {
    fn from(field: &str) -> Self {
        KeySpec::Field(field.to_string())
    }
}

impl From<String> for KeySpec {
    fn from(field: String) -> Self {
        KeySpec::Field(field)
    }
}

impl<S: Into<String>> From<Vec<S>> for KeySpec {
    fn from(fields: Vec<S>) -> Self {
        KeySpec::Fields(fields.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for KeySpec {
    fn from(fields: [S; N]) -> Self {
        KeySpec::Fields(fields.into_iter().map(Into::into).collect())
    }
}

/// Derive the record identifier for `context` under an optional key spec.
pub fn identify(context: &Context, key_spec: Option<&KeySpec>) -> String {
    if let Some(rendered) = context.render() {
        return rendered;
    }

    match key_spec {
        Some(KeySpec::Field(name)) => match context.field(name) {
            Some(Context::Null) | None => structural_hash(context),
            Some(value) => direct_key(value).unwrap_or_else(|| structural_hash(value)),
        },
        Some(KeySpec::Fields(names)) if matches!(context, Context::Composite(_)) => {
            let projection: BTreeMap<String, Context> = names
                .iter()
                .filter_map(|name| {
                    context
                        .field(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect();
            if projection.is_empty() {
                return structural_hash(context);
            }
            structural_hash(&Context::Composite(projection))
        }
        _ => structural_hash(context),
    }
}

fn direct_key(value: &Context) -> Option<String> {
    match value {
        Context::String(s) if s.chars().count() > MAX_DIRECT_KEY_LEN => None,
        other => other.render(),
    }
}

/// SHA-256 over a canonical encoding of `context`, as lowercase hex.
pub fn structural_hash(context: &Context) -> String {
    let mut hasher = Sha256::new();
    feed(&mut hasher, context);
    format!("{:x}", hasher.finalize())
}

fn feed(hasher: &mut Sha256, context: &Context) {
    match context {
        Context::Null => hasher.update(b"n"),
        Context::Boolean(b) => hasher.update([b'b', *b as u8]),
        Context::Number(n) => {
            hasher.update(b"d");
            feed_bytes(hasher, n.to_string().as_bytes());
        }
        Context::String(s) => {
            hasher.update(b"s");
            feed_bytes(hasher, s.as_bytes());
        }
        Context::Pattern(re) => {
            hasher.update(b"p");
            feed_bytes(hasher, re.as_str().as_bytes());
        }
        Context::List(items) => {
            hasher.update(b"l");
            hasher.update((items.len() as u64).to_le_bytes());
            for item in items {
                feed(hasher, item);
            }
        }
        Context::Composite(fields) => {
            hasher.update(b"o");
            hasher.update((fields.len() as u64).to_le_bytes());
            for (name, value) in fields {
                feed_bytes(hasher, name.as_bytes());
                feed(hasher, value);
            }
        }
    }
}

fn feed_bytes(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}
