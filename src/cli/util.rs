use std::io::Write;

/// Largest value accepted by integer flags.
pub const MAX_FLAG_INTEGER: u32 = 1_000_000_000;

mod build_info {
    include!(concat!(env!("OUT_DIR"), "/build_info.rs"));
}

/// Cipher backend the bundled SQLite was built with (`sqlite` or `sqlcipher`).
#[must_use]
pub fn cipher_backend() -> &'static str {
    build_info::CIPHER_BACKEND
}

#[must_use]
pub fn compiled_features() -> &'static [&'static str] {
    build_info::COMPILED_FEATURES
}

pub fn write_usage(err: &mut dyn Write) {
    let _ = write!(
        err,
        "dbrepair - SQLite/SQLCipher maintenance tool (cipher backend: {backend})

Usage:
  dbrepair check  <dbPath>
  dbrepair backup <dbPath>
  dbrepair repair <dbPath> [--key-hex <hex>] [--cipher-page-size <n>]
                           [--cipher-version <default|1|2|3|4>]
                           [--kdf-iter <n>] [--cipher-hmac-algorithm <name>]
                           [--no-sql-trace] [--no-full-sql-trace] [--no-progress]
  dbrepair deposit <dbPath>
  dbrepair contains-deposited <dbPath>
  dbrepair remove-deposited <dbPath>
  dbrepair -h | --help | help

Notes:
  - Flags are accepted after the path of every command.
  - repair salvages readable rows into a fresh database; the original files
    are kept next to it with a -corrupted suffix.
  - --key-hex takes the cipher key as hexadecimal; whitespace is ignored.
    The decoded bytes are the SQLCipher passphrase.
  - Cipher flags need a SQLCipher build; other builds report them as failed.

Exit codes: 0 success, 1 operation failed or corruption found, 2 usage error.
",
        backend = cipher_backend()
    );
    let _ = err.flush();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_lists_every_command() {
        let mut buf = Vec::new();
        write_usage(&mut buf);
        let text = String::from_utf8(buf).unwrap();
        for word in ["check", "backup", "repair", "deposit", "contains-deposited", "remove-deposited", "--kdf-iter"] {
            assert!(text.contains(word), "usage is missing {word}");
        }
    }
}
