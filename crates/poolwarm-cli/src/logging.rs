use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Default filter. The driver logs every statement at debug, which would
/// drown out per-batch progress.
const DEFAULT_DIRECTIVES: &str = "info,sqlx=warn";
const VERBOSE_DIRECTIVES: &str = "debug,sqlx=warn";

/// Install the global subscriber. `RUST_LOG` wins unless `--verbose` is set.
pub fn init(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new(VERBOSE_DIRECTIVES)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES))
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(verbose)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
