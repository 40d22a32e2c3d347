//! Signature images submitted with a registration.
//!
//! Decoding happens before the booking is committed so malformed input is a
//! validation error; the file itself is written afterwards and a write failure
//! only gets logged.

use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use crate::limits::MAX_SIGNATURE_BYTES;
use crate::model::Person;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureKind {
    Attendee,
    Artist,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    Empty,
    Malformed(String),
    TooLarge(usize),
}

impl std::fmt::Display for SignatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignatureError::Empty => write!(f, "signature is empty"),
            SignatureError::Malformed(e) => write!(f, "signature is not valid base64: {e}"),
            SignatureError::TooLarge(n) => {
                write!(f, "signature is {n} bytes, max {MAX_SIGNATURE_BYTES}")
            }
        }
    }
}

impl std::error::Error for SignatureError {}

/// Decode a base64 image, with or without a `data:<mime>;base64,` prefix.
pub fn decode(encoded: &str) -> Result<Vec<u8>, SignatureError> {
    let trimmed = encoded.trim();
    let body = match trimmed.split_once(',') {
        Some((prefix, rest)) if prefix.starts_with("data:") => rest,
        _ => trimmed,
    };
    if body.is_empty() {
        return Err(SignatureError::Empty);
    }
    // Base64 expands by 4/3; reject oversized input before allocating.
    if body.len() / 4 * 3 > MAX_SIGNATURE_BYTES {
        return Err(SignatureError::TooLarge(body.len() / 4 * 3));
    }
    let bytes = STANDARD
        .decode(body)
        .map_err(|e| SignatureError::Malformed(e.to_string()))?;
    if bytes.len() > MAX_SIGNATURE_BYTES {
        return Err(SignatureError::TooLarge(bytes.len()));
    }
    Ok(bytes)
}

/// Keep `[A-Za-z0-9_-]`, replace everything else with `_`.
pub fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct SignatureStore {
    root: PathBuf,
}

impl SignatureStore {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            root: data_dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, kind: SignatureKind, person: &Person) -> PathBuf {
        let last = sanitize(&person.last_name);
        let first = sanitize(&person.first_name);
        match kind {
            SignatureKind::Attendee => self
                .root
                .join("signatures")
                .join(format!("{last}_{first}.png")),
            SignatureKind::Artist => self
                .root
                .join("artist_signatures")
                .join(format!("artist_{last}_{first}.png")),
        }
    }

    /// Write the decoded image. Errors are logged, never returned.
    pub async fn save(&self, kind: SignatureKind, person: &Person, bytes: &[u8]) {
        let path = self.path_for(kind, person);
        let result = async {
            if let Some(dir) = path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::write(&path, bytes).await
        }
        .await;
        match result {
            Ok(()) => tracing::debug!(path = %path.display(), "signature saved"),
            Err(e) => tracing::error!(path = %path.display(), "failed to save signature: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_plain_and_data_url() {
        assert_eq!(decode("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode("data:image/png;base64,aGVsbG8=").unwrap(), b"hello");
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode("not base64!!"), Err(SignatureError::Malformed(_))));
        assert_eq!(decode("  "), Err(SignatureError::Empty));
        assert_eq!(decode("data:image/png;base64,"), Err(SignatureError::Empty));
    }

    #[test]
    fn sanitize_strips_path_characters() {
        assert_eq!(sanitize("../etc"), "___etc");
        assert_eq!(sanitize("Müller-Lü"), "M_ller-L_");
        assert_eq!(sanitize("van der Berg"), "van_der_Berg");
    }

    #[test]
    fn paths_per_kind() {
        let store = SignatureStore::new(Path::new("/data"));
        let person = Person {
            first_name: "Ada".into(),
            last_name: "Love lace".into(),
            email: "a@b.c".into(),
            phone: String::new(),
        };
        assert_eq!(
            store.path_for(SignatureKind::Attendee, &person),
            PathBuf::from("/data/signatures/Love_lace_Ada.png")
        );
        assert_eq!(
            store.path_for(SignatureKind::Artist, &person),
            PathBuf::from("/data/artist_signatures/artist_Love_lace_Ada.png")
        );
    }

    #[tokio::test]
    async fn save_writes_file() {
        let dir = std::env::temp_dir().join("eventdesk_test_signature");
        let _ = std::fs::remove_dir_all(&dir);
        let store = SignatureStore::new(&dir);
        let person = Person {
            first_name: "Ada".into(),
            last_name: "Lovelace".into(),
            email: "a@b.c".into(),
            phone: String::new(),
        };
        store.save(SignatureKind::Attendee, &person, b"png").await;
        let written = std::fs::read(store.path_for(SignatureKind::Attendee, &person)).unwrap();
        assert_eq!(written, b"png");
    }
}
