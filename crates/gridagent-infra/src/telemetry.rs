//! Tracing subscriber setup.

use tracing_subscriber::{
    fmt::format::Format, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize the tracing subscriber.
///
/// With distributed tracing enabled the console format keeps targets and
/// timestamps so log lines correlate with the trace collector's segments;
/// otherwise a compact format is used.
pub fn init_telemetry(tracing_enabled: bool) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "gridagent=info".into());

    if tracing_enabled {
        let console_fmt = tracing_subscriber::fmt::layer().event_format(Format::default());
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .init();
        tracing::info!("distributed tracing enabled");
    } else {
        let console_fmt = tracing_subscriber::fmt::layer().event_format(
            Format::default()
                .compact()
                .with_target(false)
                .without_time(),
        );
        tracing_subscriber::registry()
            .with(filter)
            .with(console_fmt)
            .init();
    }

    Ok(())
}
