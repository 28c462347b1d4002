//! ULID-backed identifiers for jobs and templates.
//!
//! ULIDs sort lexicographically by creation time, which the file store relies
//! on when listing, and they are safe to embed in file names.

use std::{fmt, str::FromStr};

macro_rules! ulid_id {
    ($(#[$meta:meta])* $name:ident, $ext:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            id: ulid::Ulid,
        }

        impl $name {
            /// Generate a new unique identifier
            #[must_use]
            pub fn generate() -> Self {
                Self {
                    id: ulid::Ulid::new(),
                }
            }

            #[must_use]
            pub const fn new(id: ulid::Ulid) -> Self {
                Self { id }
            }

            /// Get the underlying ULID
            #[must_use]
            pub const fn ulid(&self) -> ulid::Ulid {
                self.id
            }

            /// Milliseconds since the Unix epoch encoded in this identifier
            #[must_use]
            pub const fn timestamp_ms(&self) -> u64 {
                self.id.timestamp_ms()
            }

            /// Parse an identifier from a file name such as `01ARYZ6S41TSV4RRFFQ69G5FAV.job`
            ///
            /// Rejects path separators, traversal patterns and anything that is
            /// not a valid ULID followed by the expected extension.
            #[must_use]
            pub fn from_filename(filename: &str) -> Option<Self> {
                if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
                    return None;
                }

                let stem = filename.strip_suffix(concat!(".", $ext))?;
                ulid::Ulid::from_string(stem).ok().map(Self::new)
            }

            /// File name this identifier is persisted under
            #[must_use]
            pub fn filename(&self) -> String {
                format!(concat!("{}.", $ext), self.id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.id)
            }
        }

        impl FromStr for $name {
            type Err = ulid::DecodeError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                ulid::Ulid::from_string(s).map(Self::new)
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(&self.id.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

ulid_id!(
    /// Identifier of an email job, generated at creation
    JobId,
    "job"
);

ulid_id!(
    /// Generated identifier of an email template
    ///
    /// Templates are also addressable by their unique, human-chosen name.
    TemplateId,
    "tpl"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_round_trips() {
        let id = JobId::generate();
        assert_eq!(JobId::from_filename(&id.filename()), Some(id));
    }

    #[test]
    fn rejects_traversal_and_wrong_extension() {
        let id = JobId::generate();
        assert_eq!(JobId::from_filename(&format!("../{id}.job")), None);
        assert_eq!(JobId::from_filename(&format!("{id}.tpl")), None);
        assert_eq!(JobId::from_filename("not-a-ulid.job"), None);
        assert!(TemplateId::from_filename(&format!("{id}.tpl")).is_some());
    }

    #[test]
    fn ids_sort_by_creation() {
        let first = JobId::new(ulid::Ulid::from_parts(1_000, 7));
        let second = JobId::new(ulid::Ulid::from_parts(2_000, 1));
        assert!(first < second);
        assert_eq!(first.timestamp_ms(), 1_000);
    }
}
