use dbrepair::{config, logger, run_with_config};
use std::io::Write;

fn main() {
    let cfg = config::load_config();
    logger::configure(&cfg);

    // Non-UTF-8 arguments are converted lossily; the path is re-validated by the engine.
    let argv: Vec<String> = std::env::args_os().map(|a| a.to_string_lossy().into_owned()).collect();
    log::debug!(
        target: "dbrepair",
        "{} arguments, backend {}, features {:?}",
        argv.len(),
        dbrepair::cli::util::cipher_backend(),
        dbrepair::cli::util::compiled_features()
    );

    let stdout = std::io::stdout();
    let stderr = std::io::stderr();
    let code = {
        let mut out = stdout.lock();
        let mut err = stderr.lock();
        let code = run_with_config(&argv, &cfg, &mut out, &mut err);
        let _ = out.flush();
        code
    };
    log::logger().flush();
    std::process::exit(code.code());
}
