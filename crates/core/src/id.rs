// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Identifier newtypes and id generation.
//!
//! Every entity the runtime routes or stores (agents, events, decisions,
//! trails, nodes, workers) gets its own string-backed id type so the two
//! can never be swapped in a signature. The wrappers serialize as bare
//! strings, which keeps wire blobs and stored records readable.

use std::sync::atomic::{AtomicU64, Ordering};

/// Declare a string-backed identifier type.
///
/// The generated wrapper is ordered and hashable (map keys, stable
/// sorts), prints as the raw string, converts from `String`/`&str`, and
/// compares directly against `str` so call sites can write
/// `id == "ENV"`.
///
/// ```ignore
/// id_type! {
///     /// Identifies a widget.
///     pub struct WidgetId;
/// }
/// ```
#[macro_export]
macro_rules! id_type {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Leading slice of at most `len` characters, for log lines
            /// where a full UUID is noise.
            pub fn prefix(&self, len: usize) -> &str {
                match self.0.char_indices().nth(len) {
                    Some((cut, _)) => &self.0[..cut],
                    None => &self.0,
                }
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0.as_str() == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0.as_str() == *other
            }
        }
    };
}

/// Source of fresh identifier strings.
pub trait IdSource: Send + Sync {
    fn fresh(&self) -> String;
}

/// Random v4 UUIDs; what production runs use everywhere.
#[derive(Debug, Default)]
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn fresh(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Deterministic `prefix-1`, `prefix-2`, ... sequence so tests can name
/// the ids they expect.
#[derive(Debug)]
pub struct CountingIdSource {
    prefix: String,
    count: AtomicU64,
}

impl CountingIdSource {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            count: AtomicU64::new(0),
        }
    }
}

impl Default for CountingIdSource {
    fn default() -> Self {
        Self::new("id")
    }
}

impl IdSource for CountingIdSource {
    fn fresh(&self) -> String {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        format!("{}-{n}", self.prefix)
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
