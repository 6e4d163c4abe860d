//! Validated string identifiers.
//!
//! Every identifier travels as a bare JSON string. The per-kind encode and
//! decode functions live in [`IDENTIFIER_CODECS`]; the serde impls and the
//! configuration validator both go through that table.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Identifier kinds known to the codec table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    Commit,
    Job,
    Branch,
    Root,
}

/// Encode/decode pair for one identifier kind.
pub struct IdentifierCodec {
    pub kind: IdentifierKind,
    /// Field name reported in validation errors.
    pub field: &'static str,
    pub encode: fn(&str) -> String,
    /// Validates raw input and returns the canonical stored form.
    pub decode: fn(&str) -> Result<String>,
}

pub static IDENTIFIER_CODECS: [IdentifierCodec; 4] = [
    IdentifierCodec {
        kind: IdentifierKind::Commit,
        field: "commitId",
        encode: encode_verbatim,
        decode: decode_commit,
    },
    IdentifierCodec {
        kind: IdentifierKind::Job,
        field: "jobName",
        encode: encode_verbatim,
        decode: decode_job,
    },
    IdentifierCodec {
        kind: IdentifierKind::Branch,
        field: "branchName",
        encode: encode_verbatim,
        decode: decode_branch,
    },
    IdentifierCodec {
        kind: IdentifierKind::Root,
        field: "rootName",
        encode: encode_verbatim,
        decode: decode_root,
    },
];

/// Look up the codec registered for `kind`.
pub fn codec(kind: IdentifierKind) -> &'static IdentifierCodec {
    let index = match kind {
        IdentifierKind::Commit => 0,
        IdentifierKind::Job => 1,
        IdentifierKind::Branch => 2,
        IdentifierKind::Root => 3,
    };
    &IDENTIFIER_CODECS[index]
}

fn encode_verbatim(value: &str) -> String {
    value.to_string()
}

const COMMIT_ID_LEN: usize = 40;

fn decode_commit(raw: &str) -> Result<String> {
    if raw.len() != COMMIT_ID_LEN {
        return Err(CoreError::validation(
            "commitId",
            format!("expected {COMMIT_ID_LEN} hex characters, got {} ('{raw}')", raw.len()),
        ));
    }
    if !raw.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(CoreError::validation(
            "commitId",
            format!("'{raw}' is not lowercase hexadecimal"),
        ));
    }
    Ok(raw.to_string())
}

fn decode_non_empty(field: &'static str, raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation(field, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

fn decode_job(raw: &str) -> Result<String> {
    decode_non_empty("jobName", raw)
}

fn decode_branch(raw: &str) -> Result<String> {
    decode_non_empty("branchName", raw)
}

fn decode_root(raw: &str) -> Result<String> {
    decode_non_empty("rootName", raw)
}

macro_rules! identifier {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(String);

        impl $name {
            pub const KIND: IdentifierKind = $kind;

            /// Validate `raw` and build the identifier.
            pub fn parse(raw: impl AsRef<str>) -> Result<Self> {
                (codec(Self::KIND).decode)(raw.as_ref()).map(Self)
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self> {
                Self::parse(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(
                &self,
                serializer: S,
            ) -> std::result::Result<S::Ok, S::Error> {
                serializer.serialize_str(&(codec(Self::KIND).encode)(&self.0))
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(
                deserializer: D,
            ) -> std::result::Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                Self::parse(&raw).map_err(serde::de::Error::custom)
            }
        }
    };
}

identifier!(
    /// 40-character lowercase hexadecimal commit hash.
    CommitId,
    IdentifierKind::Commit
);

identifier!(
    /// Name of a build-server job.
    JobName,
    IdentifierKind::Job
);

identifier!(
    /// Version-control branch name.
    BranchName,
    IdentifierKind::Branch
);

identifier!(
    /// Logical grouping of jobs ("core", "ui", ...).
    RootName,
    IdentifierKind::Root
);

impl CommitId {
    /// Abbreviated hash for log output.
    pub fn short(&self) -> &str {
        &self.0[..10]
    }
}
