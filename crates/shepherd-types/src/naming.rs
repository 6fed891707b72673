use rand::Rng;
use sha2::{Digest, Sha256};

use crate::error::ModelError;

/// Room reserved for the `-token` suffix on the owned TokenSecret's name.
pub const TOKEN_SUFFIX_LEN: usize = "-token".len();
pub const MAX_NAME_LEN: usize = 63 - TOKEN_SUFFIX_LEN;

const TASK_PREFIX: &str = "task-";
const RANDOM_SUFFIX_LEN: usize = 8;
const SUFFIX_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Generates a name of the form `task-{8 char lowercase alphanumeric}`.
pub fn generate_task_name() -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..SUFFIX_ALPHABET.len());
            SUFFIX_ALPHABET[idx] as char
        })
        .collect();
    format!("{TASK_PREFIX}{suffix}")
}

/// Validates a task name against DNS-label rules and the 57-character budget.
pub fn validate_task_name(name: &str) -> Result<(), ModelError> {
    if name.len() > MAX_NAME_LEN {
        return Err(ModelError::NameTooLong(name.to_string(), name.len(), MAX_NAME_LEN));
    }
    let valid = !name.is_empty()
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && name.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
        && name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !valid {
        return Err(ModelError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Per-assignment bearer token material: the plaintext (handed to the runner
/// once, never persisted) and its SHA-256 hex digest (the only form stored,
/// in the TokenSecret's `token-hash` field).
pub struct TokenMaterial {
    pub plaintext: String,
    pub hash_hex: String,
}

/// Generates 32 cryptographically-random bytes, hex-encodes them as the
/// plaintext token, and returns both the plaintext and its SHA-256 digest.
pub fn generate_token() -> TokenMaterial {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    let plaintext = hex::encode(bytes);
    let hash_hex = hash_token(&plaintext);
    TokenMaterial { plaintext, hash_hex }
}

pub fn hash_token(plaintext: &str) -> String {
    let digest = Sha256::digest(plaintext.as_bytes());
    hex::encode(digest)
}

/// Normalises a repository label value: strip scheme, trim a trailing
/// `.git`, replace `/` with `-`. Idempotent for valid input.
pub fn normalise_repo_label(value: &str) -> String {
    let stripped = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .unwrap_or(value);
    let trimmed = stripped.strip_suffix(".git").unwrap_or(stripped);
    trimmed.replace('/', "-")
}

/// Kubernetes label-value grammar: up to 63 chars, alphanumeric plus
/// `-_.`, must start and end alphanumeric (empty string is valid).
pub fn validate_label_value(value: &str) -> Result<(), ModelError> {
    if value.is_empty() {
        return Ok(());
    }
    let valid = value.len() <= 63
        && value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric())
        && value.chars().last().is_some_and(|c| c.is_ascii_alphanumeric())
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
    if !valid {
        return Err(ModelError::InvalidLabelValue(value.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_valid_and_well_formed() {
        for _ in 0..50 {
            let name = generate_task_name();
            assert!(name.starts_with(TASK_PREFIX));
            assert_eq!(name.len(), TASK_PREFIX.len() + RANDOM_SUFFIX_LEN);
            validate_task_name(&name).unwrap();
        }
    }

    #[test]
    fn name_length_boundary() {
        let ok = "a".repeat(MAX_NAME_LEN);
        validate_task_name(&ok).unwrap();
        let too_long = "a".repeat(MAX_NAME_LEN + 1);
        assert!(validate_task_name(&too_long).is_err());
    }

    #[test]
    fn token_hash_matches_sha256() {
        let material = generate_token();
        assert_eq!(material.plaintext.len(), 64);
        assert_eq!(material.hash_hex, hash_token(&material.plaintext));
        assert_ne!(material.plaintext, material.hash_hex);
    }

    #[test]
    fn repo_label_normalisation_is_idempotent() {
        let raw = "https://github.com/octo/repo.git";
        let once = normalise_repo_label(raw);
        assert_eq!(once, "github.com-octo-repo");
        let twice = normalise_repo_label(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn label_value_grammar() {
        validate_label_value("").unwrap();
        validate_label_value("github.com-octo-repo").unwrap();
        assert!(validate_label_value("-leading-dash").is_err());
        assert!(validate_label_value("trailing-dash-").is_err());
        assert!(validate_label_value("has space").is_err());
    }
}
