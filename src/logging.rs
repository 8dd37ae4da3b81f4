use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the global tracing subscriber. Safe to call more than once; later
/// calls are no-ops.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}
