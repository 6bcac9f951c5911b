//! Storage namespace derivation.
//!
//! Each isolated instance gets its own proxy storage directory (`-S <name>`)
//! so concurrent instances never share rule or config state.

use std::borrow::Cow;

/// Derive the namespace for an instance.
///
/// Returns `None` when `shared` is set, meaning the proxy's default storage.
/// Otherwise returns `<tag>-<seq_id>` with both parts percent-encoded, which
/// keeps the name URL-safe and makes distinct sequence ids map to distinct
/// names.
pub fn resolve_namespace(tag: &str, seq_id: &str, shared: bool) -> Option<String> {
    if shared {
        return None;
    }
    Some(format!("{}-{}", encode(tag), encode(seq_id)))
}

fn encode(part: &str) -> Cow<'_, str> {
    urlencoding::encode(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONTROLLER_TAG;
    use rand::Rng;
    use rand::distributions::{Alphanumeric, DistString};
    use std::collections::HashMap;

    #[test]
    fn shared_is_always_none() {
        assert_eq!(resolve_namespace(CONTROLLER_TAG, "abc", true), None);
        assert_eq!(resolve_namespace("", "", true), None);
    }

    #[test]
    fn isolated_name_combines_tag_and_seq() {
        assert_eq!(
            resolve_namespace(CONTROLLER_TAG, "test", false).as_deref(),
            Some("auto-whistle-sdk-test")
        );
    }

    #[test]
    fn deterministic() {
        let a = resolve_namespace(CONTROLLER_TAG, "2026-10-19-1", false);
        let b = resolve_namespace(CONTROLLER_TAG, "2026-10-19-1", false);
        assert_eq!(a, b);
    }

    #[test]
    fn unsafe_characters_are_encoded() {
        let ns = resolve_namespace(CONTROLLER_TAG, "a b/c?d", false).unwrap();
        assert_eq!(ns, "auto-whistle-sdk-a%20b%2Fc%3Fd");
        assert!(!ns.contains(' '));
        assert!(!ns.contains('/'));
    }

    #[test]
    fn random_seq_ids_never_collide() {
        let mut rng = rand::thread_rng();
        let mut seen: HashMap<String, String> = HashMap::new();

        for _ in 0..20_000 {
            let len = rng.gen_range(1..12);
            let mut seq = Alphanumeric.sample_string(&mut rng, len);
            // Mix in separators and characters that need encoding.
            if rng.gen_bool(0.3) {
                seq.push_str(["-", "/", " ", "%", "é"][rng.gen_range(0..5)]);
            }
            let ns = resolve_namespace(CONTROLLER_TAG, &seq, false).unwrap();
            if let Some(previous) = seen.insert(ns.clone(), seq.clone()) {
                assert_eq!(previous, seq, "{previous:?} and {seq:?} both map to {ns}");
            }
        }
    }
}
