use std::sync::OnceLock;
use strum::{Display, EnumString, IntoStaticStr};
use thiserror::Error;
use tracing::subscriber::{SetGlobalDefaultError, set_global_default};
use tracing_subscriber::EnvFilter;

static INIT: OnceLock<Result<(), InstrumentationError>> = OnceLock::new();

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum LogFormat {
    Json,
    #[default]
    Text,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
}

#[derive(Debug, Clone, Error)]
pub enum InstrumentationError {
    #[error("Failed to set tracing subscriber: {0}")]
    SetSubscriber(String),
}

impl From<SetGlobalDefaultError> for InstrumentationError {
    fn from(err: SetGlobalDefaultError) -> Self {
        Self::SetSubscriber(err.to_string())
    }
}

/// `RUST_LOG` wins over the configured level so individual targets can be tuned.
fn env_filter(level: LogLevel) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(<&str>::from(level)))
}

pub fn init_instrumentation(format: LogFormat, level: LogLevel) -> Result<(), InstrumentationError> {
    INIT.get_or_init(|| {
        let filter = env_filter(level);
        match format {
            LogFormat::Json => {
                let subscriber = tracing_subscriber::fmt()
                    .json()
                    .with_env_filter(filter)
                    .with_current_span(true)
                    .finish();
                set_global_default(subscriber)?;
            }
            LogFormat::Text => {
                let subscriber = tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_level(true)
                    .finish();
                set_global_default(subscriber)?;
            }
        }
        Ok(())
    })
    .clone()
}
