use env_logger;

/// Initialize the logger with the specified verbosity level
///
/// # Arguments
/// * `verbose` - Verbosity level (0=warn, 1=info, 2=debug, 3+=trace)
pub fn setup_logger(verbose: u8) {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(default_filter(verbose)),
    )
    .format_timestamp(None)
    .format_module_path(false)
    .format_target(false)
    .init();
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "paced=warn",
        1 => "paced=info",
        2 => "paced=debug",
        _ => "paced=trace",
    }
}
