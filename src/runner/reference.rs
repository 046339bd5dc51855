//! Model reference normalization.
//!
//! References pulled from the HuggingFace registry are case-insensitive on
//! the server side but case-sensitive in the local store, so they are
//! lowercased before hitting the wire. Short model IDs (the 12-hex display
//! form, or a digest without its prefix) are expanded against the model list
//! by the client before use.

const HUGGINGFACE_PREFIX: &str = "hf.co/";
const DIGEST_PREFIX: &str = "sha256:";

/// Normalizes a model reference for the wire.
pub fn normalize(reference: &str) -> String {
    if reference.starts_with(HUGGINGFACE_PREFIX) {
        reference.to_lowercase()
    } else {
        reference.to_string()
    }
}

/// True when the reference carries no repository component and may be a
/// model ID that needs expansion against the model list.
pub fn is_bare_id(reference: &str) -> bool {
    !reference.trim_matches('/').contains('/')
}

/// Display form of a layer or model ID: digests drop the `sha256:` prefix
/// and show the next 12 characters, other IDs are truncated to 12.
pub fn short_id(raw: &str) -> &str {
    if let Some(digest) = raw.strip_prefix(DIGEST_PREFIX) {
        if digest.len() >= 12 {
            return &digest[..12];
        }
        return digest;
    }
    if raw.len() > 12 {
        return &raw[..12];
    }
    raw
}

/// True when `candidate` (a full model ID, usually `sha256:<hex>`) is
/// identified by `id`: the 12-hex shorthand, the digest without its prefix,
/// or the full ID itself.
pub fn id_matches(id: &str, candidate: &str) -> bool {
    if id == candidate {
        return true;
    }
    if let Some(digest) = candidate.strip_prefix(DIGEST_PREFIX) {
        if digest == id {
            return true;
        }
        if digest.len() >= 12 && &digest[..12] == id {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn huggingface_references_are_lowercased() {
        assert_eq!(
            normalize("hf.co/Bartowski/Llama-3.2-1B-Instruct-GGUF"),
            "hf.co/bartowski/llama-3.2-1b-instruct-gguf"
        );
    }

    #[test]
    fn other_references_pass_through() {
        assert_eq!(normalize("ai/SmolLM2"), "ai/SmolLM2");
        assert_eq!(normalize("docker.io/library/llama2"), "docker.io/library/llama2");
    }

    #[test]
    fn bare_ids_have_no_repository() {
        assert!(is_bare_id("1a12b4ea7c0c"));
        assert!(is_bare_id("sha256:abcdef"));
        assert!(is_bare_id("/1a12b4ea7c0c/"));
        assert!(!is_bare_id("ai/smollm2"));
        assert!(!is_bare_id("hf.co/bartowski/llama"));
    }

    #[test]
    fn digest_short_id_skips_prefix() {
        assert_eq!(short_id("sha256:1a12b4ea7c0c123456789"), "1a12b4ea7c0c");
    }

    #[test]
    fn plain_id_truncates_to_twelve() {
        assert_eq!(short_id("abcdefghijklmnop"), "abcdefghijkl");
        assert_eq!(short_id("short"), "short");
    }

    #[test]
    fn id_matching_accepts_all_three_forms() {
        let full = "sha256:1a12b4ea7c0c0123456789abcdef";
        assert!(id_matches("1a12b4ea7c0c", full));
        assert!(id_matches("1a12b4ea7c0c0123456789abcdef", full));
        assert!(id_matches(full, full));
        assert!(!id_matches("ffffffffffff", full));
    }
}
