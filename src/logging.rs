use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// `RUST_LOG` refines the level picked by `verbosity_level`
pub fn setup_tracing(verbosity_level: u8, json: bool) -> anyhow::Result<()> {
    let filter = match verbosity_level {
        0 => tracing::level_filters::LevelFilter::INFO,
        1 => tracing::level_filters::LevelFilter::DEBUG,
        _ => tracing::level_filters::LevelFilter::TRACE,
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(filter.into())
        .from_env_lossy();

    let stderr_writer = if json {
        fmt::Layer::default()
            .json()
            .with_thread_names(true)
            .with_file(true)
            .with_line_number(true)
            .with_span_list(true)
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::Layer::default()
            .with_thread_names(true)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(stderr_writer)
        .with(env_filter)
        .try_init()?;
    Ok(())
}
