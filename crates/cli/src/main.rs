use std::env;
use std::process::ExitCode;

fn init_logging() {
    use tracing::Level;

    let level = env::var("PRICEKIT_LOG_LEVEL")
        .ok()
        .and_then(|value| value.parse::<Level>().ok())
        .unwrap_or(Level::WARN);
    let format = env::var("PRICEKIT_LOG_FORMAT").unwrap_or_default();

    match format.as_str() {
        "pretty" => {
            tracing_subscriber::fmt().with_target(false).with_max_level(level).pretty().init();
        }
        "json" => {
            tracing_subscriber::fmt().with_target(false).with_max_level(level).json().init();
        }
        _ => {
            tracing_subscriber::fmt().with_target(false).with_max_level(level).compact().init();
        }
    }
}

fn main() -> ExitCode {
    init_logging();
    pricekit_cli::run()
}
