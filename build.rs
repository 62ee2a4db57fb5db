use std::env;
use std::fs;
use std::path::PathBuf;

// Emits `build_info.rs` into OUT_DIR so the usage text can report which
// cipher backend the bundled SQLite was compiled with.
fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").expect("OUT_DIR"));
    let mut features: Vec<String> = env::vars()
        .filter_map(|(k, _)| {
            k.strip_prefix("CARGO_FEATURE_")
                .map(|name| name.to_ascii_lowercase().replace('_', "-"))
        })
        .collect();
    features.sort();
    let backend = if features.iter().any(|f| f == "sqlcipher") { "sqlcipher" } else { "sqlite" };
    let list = features.iter().map(|s| format!("{s:?}")).collect::<Vec<_>>().join(", ");
    let content = format!(
        "pub static COMPILED_FEATURES: &[&str] = &[{list}];\npub const CIPHER_BACKEND: &str = {backend:?};\n"
    );
    fs::write(out.join("build_info.rs"), content).expect("write build_info.rs");
    println!("cargo:rerun-if-changed=build.rs");
}
