use once_cell::sync::OnceCell;
use tracing_subscriber::{reload::Handle, EnvFilter};

static RELOAD_HANDLE: OnceCell<Handle<EnvFilter, tracing_subscriber::Registry>> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("invalid log filter '{0}': {1}")]
    Filter(String, tracing_subscriber::filter::ParseError),
    #[error("failed to install subscriber: {0}")]
    Install(#[from] tracing_subscriber::util::TryInitError),
    #[error("failed to reload filter: {0}")]
    Reload(#[from] tracing_subscriber::reload::Error),
}

fn parse_filter(level: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(level).map_err(|err| LoggingError::Filter(level.to_string(), err))
}

/// Installs the global subscriber on first call; later calls only swap the filter.
pub fn init(level: &str, json: bool) -> Result<(), LoggingError> {
    let handle = RELOAD_HANDLE.get_or_try_init(|| {
        use tracing_subscriber::prelude::*;

        let (filter, handle) = tracing_subscriber::reload::Layer::new(parse_filter(level)?);
        let registry = tracing_subscriber::registry().with(filter);
        if json {
            registry
                .with(tracing_subscriber::fmt::layer().json().with_line_number(true))
                .try_init()?;
        } else {
            registry
                .with(tracing_subscriber::fmt::layer().with_line_number(true).with_file(true))
                .try_init()?;
        }
        Ok::<_, LoggingError>(handle)
    })?;

    handle.reload(parse_filter(level)?)?;
    Ok(())
}
