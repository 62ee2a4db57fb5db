//! The validated, typed form of one invocation's arguments.

use std::fmt;
use std::path::PathBuf;
use zeroize::Zeroizing;

pub const DEFAULT_CIPHER_PAGE_SIZE: u32 = 4096;

/// Maintenance operation selected by `argv[1]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Check,
    Backup,
    Deposit,
    ContainsDeposited,
    RemoveDeposited,
    Repair,
    Help,
    /// A command word nobody recognised; carried so the runner can report it.
    Invalid(String),
}

impl Command {
    /// Maps a command word to its variant. Never fails: unknown words become [`Command::Invalid`].
    #[must_use]
    pub fn from_word(word: &str) -> Self {
        match word {
            "check" => Self::Check,
            "backup" => Self::Backup,
            "deposit" => Self::Deposit,
            "contains-deposited" => Self::ContainsDeposited,
            "remove-deposited" => Self::RemoveDeposited,
            "repair" => Self::Repair,
            "-h" | "--help" | "help" => Self::Help,
            other => Self::Invalid(other.to_string()),
        }
    }

    /// Name used in `RESULT=<name>` lines.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Check => "check",
            Self::Backup => "backup",
            Self::Deposit => "deposit",
            Self::ContainsDeposited => "contains-deposited",
            Self::RemoveDeposited => "remove-deposited",
            Self::Repair => "repair",
            Self::Help => "help",
            Self::Invalid(_) => "invalid",
        }
    }

    /// Upper-case form used in `STATE=<NAME>_START` markers.
    #[must_use]
    pub fn state_name(&self) -> String {
        self.name().replace('-', "_").to_ascii_uppercase()
    }

    #[must_use]
    pub fn needs_engine(&self) -> bool {
        !matches!(self, Self::Help | Self::Invalid(_))
    }
}

/// SQLCipher compatibility preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CipherVersion {
    #[default]
    Default,
    V1,
    V2,
    V3,
    V4,
}

impl CipherVersion {
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "1" => Some(Self::V1),
            "2" => Some(Self::V2),
            "3" => Some(Self::V3),
            "4" => Some(Self::V4),
            _ => None,
        }
    }

    /// Value for `PRAGMA cipher_compatibility`, or `None` to keep the engine's default.
    #[must_use]
    pub fn compatibility(self) -> Option<u32> {
        match self {
            Self::Default => None,
            Self::V1 => Some(1),
            Self::V2 => Some(2),
            Self::V3 => Some(3),
            Self::V4 => Some(4),
        }
    }
}

impl fmt::Display for CipherVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.compatibility() {
            Some(n) => write!(f, "{n}"),
            None => f.write_str("default"),
        }
    }
}

/// Raw cipher key bytes, wiped on drop and never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct CipherKey(Zeroizing<Vec<u8>>);

impl CipherKey {
    #[must_use]
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for CipherKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CipherKey(<{} bytes redacted>)", self.0.len())
    }
}

/// Everything the applier and dispatcher need. Built once by the argument
/// grammar and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub command: Command,
    /// Empty only for [`Command::Help`].
    pub target_path: PathBuf,
    pub show_progress: bool,
    pub cipher_key: Option<CipherKey>,
    pub cipher_page_size: u32,
    pub cipher_version: CipherVersion,
    pub kdf_iterations: Option<u32>,
    pub cipher_hmac_algorithm: Option<String>,
    pub sql_trace_enabled: bool,
    pub full_sql_trace_enabled: bool,
}

impl Options {
    /// Defaults for `command` against `target_path`.
    pub fn new(command: Command, target_path: impl Into<PathBuf>) -> Self {
        Self {
            command,
            target_path: target_path.into(),
            show_progress: true,
            cipher_key: None,
            cipher_page_size: DEFAULT_CIPHER_PAGE_SIZE,
            cipher_version: CipherVersion::Default,
            kdf_iterations: None,
            cipher_hmac_algorithm: None,
            sql_trace_enabled: true,
            full_sql_trace_enabled: true,
        }
    }

    #[must_use]
    pub fn help() -> Self {
        Self::new(Command::Help, PathBuf::new())
    }

    #[must_use]
    pub fn has_cipher_pragmas(&self) -> bool {
        self.kdf_iterations.is_some() || self.cipher_hmac_algorithm.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_words_round_trip_through_names() {
        for word in ["check", "backup", "deposit", "contains-deposited", "remove-deposited", "repair"] {
            assert_eq!(Command::from_word(word).name(), word);
        }
        assert_eq!(Command::from_word("--help"), Command::Help);
        assert_eq!(Command::from_word("frobnicate"), Command::Invalid("frobnicate".into()));
    }

    #[test]
    fn state_names_are_upper_snake() {
        assert_eq!(Command::ContainsDeposited.state_name(), "CONTAINS_DEPOSITED");
        assert_eq!(Command::Repair.state_name(), "REPAIR");
    }

    #[test]
    fn cipher_version_display_and_parse() {
        assert_eq!(CipherVersion::parse("default"), Some(CipherVersion::Default));
        assert_eq!(CipherVersion::parse("3"), Some(CipherVersion::V3));
        assert_eq!(CipherVersion::parse("5"), None);
        assert_eq!(CipherVersion::V4.to_string(), "4");
        assert_eq!(CipherVersion::Default.to_string(), "default");
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = CipherKey::new(vec![0xde, 0xad]);
        let dbg = format!("{key:?}");
        assert!(!dbg.contains("222"));
        assert!(dbg.contains("2 bytes"));
    }

    #[test]
    fn defaults_match_documented_values() {
        let o = Options::new(Command::Check, "a.db");
        assert!(o.show_progress && o.sql_trace_enabled && o.full_sql_trace_enabled);
        assert_eq!(o.cipher_page_size, 4096);
        assert!(o.cipher_key.is_none() && !o.has_cipher_pragmas());
    }
}
