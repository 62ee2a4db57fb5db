#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
struct Invocation {
    words: Vec<String>,
}

fuzz_target!(|inv: Invocation| {
    if inv.words.len() > 32 { return; }
    let mut argv = vec!["dbrepair".to_string()];
    argv.extend(inv.words);
    // parsing is total and deterministic
    let first = dbrepair::cli::parse(&argv);
    let second = dbrepair::cli::parse(&argv);
    assert_eq!(first, second);
});
