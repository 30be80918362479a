//! SKU synthesis for records that arrive without a usable key.
//!
//! Keys are collision-resistant, not collision-proof: the loader's duplicate
//! classification is the real backstop. Synthesis itself never fails.

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Prefix substituted when normalization strips a name down to nothing.
const PLACEHOLDER_PREFIX: &str = "ITEM";

/// Length of the random disambiguator token. Eight case-folded alphanumerics
/// keep the birthday-collision odds across a full catalog import negligible.
const TOKEN_LEN: usize = 8;

/// How a fresh SKU is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyPolicy {
    /// `<name-prefix>-<token>`: a short normalized slice of the record name
    /// plus a random token. The usual choice for a first import.
    #[default]
    DeterministicPrefix,

    /// `<yymmddHHMM><token>-<name-prefix>`: coarse timestamp salt so keys can
    /// never collide with those of a prior run, for re-imports after a failed
    /// purge.
    TimestampSalted,
}

/// Synthesizes unique SKUs in the format `<prefix>-<disambiguator>`.
#[derive(Debug, Clone)]
pub struct KeySynthesizer {
    policy: KeyPolicy,
    prefix_len: usize,
}

impl Default for KeySynthesizer {
    fn default() -> Self {
        Self {
            policy: KeyPolicy::DeterministicPrefix,
            prefix_len: 4,
        }
    }
}

impl KeySynthesizer {
    pub fn new(policy: KeyPolicy, prefix_len: usize) -> Self {
        Self {
            policy,
            prefix_len: prefix_len.max(1),
        }
    }

    /// Produce a SKU for a record with the given name.
    ///
    /// Always returns a non-empty key; an empty normalized prefix falls back
    /// to a fixed placeholder rather than erroring.
    pub fn synthesize(&self, name: &str) -> String {
        let prefix = self.normalize_prefix(name);
        let token = random_token(TOKEN_LEN);

        match self.policy {
            KeyPolicy::DeterministicPrefix => format!("{}-{}", prefix, token),
            KeyPolicy::TimestampSalted => {
                let stamp = Utc::now().format("%y%m%d%H%M");
                format!("{}{}-{}", stamp, token, prefix)
            }
        }
    }

    /// Trim, uppercase, strip non-alphanumerics, truncate. Falls back to the
    /// placeholder when nothing survives.
    fn normalize_prefix(&self, name: &str) -> String {
        let normalized: String = name
            .trim()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_uppercase())
            .take(self.prefix_len)
            .collect();

        if normalized.is_empty() {
            PLACEHOLDER_PREFIX.to_string()
        } else {
            normalized
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(|b| (b as char).to_ascii_uppercase())
        .collect()
}
