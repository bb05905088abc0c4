pub mod config;
pub mod liveness;

pub use config::{Config, ConfigError, LogLevel};
pub use liveness::{FlagLiveness, install_signal_liveness};

use crate::forwarder::{Forwarder, ForwarderError};
use crate::input::{InputSource, spawn_reader};
use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const INPUT_CHANNEL_CAPACITY: usize = 1024;

pub struct App {
    config: Config,
}

impl App {
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        Ok(Self {
            config: Config::from_args(args)?,
        })
    }

    pub fn from_config(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        init_logging(self.config.log_level);
        info!(
            version = crate::VERSION,
            tag = %self.config.tag,
            servers = ?self.config.servers,
            secondary = ?self.config.secondary_servers,
            "starting tail-forwarder"
        );

        let pool = self.config.server_pool()?;
        let settings = self.config.forwarder_settings();
        let source = match &self.config.input {
            Some(path) => InputSource::File(path.clone()),
            None => InputSource::Stdin,
        };

        let liveness = install_signal_liveness().context("failed to install signal handlers")?;
        let (lines, reader) = spawn_reader(source, INPUT_CHANNEL_CAPACITY);
        let forwarder = Forwarder::new(settings, pool, lines, liveness);

        let result = forwarder.run().await;
        reader.abort();

        match result {
            Ok(_summary) => Ok(()),
            Err(ForwarderError::InputClosed) => {
                // The reader already returned; surface its own error if any.
                if let Ok(Err(e)) = reader.await {
                    error!(error = %e, "input reader failed");
                    return Err(anyhow::Error::new(e));
                }
                Err(anyhow::anyhow!("input stream closed unexpectedly"))
            }
        }
    }
}

/// Diagnostic logging on stderr; never mixed into the forwarding wire.
/// `RUST_LOG` overrides the configured level.
pub fn init_logging(level: LogLevel) {
    let default = format!("tail_forwarder={}", tracing::Level::from(level));
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Binary entry point.
pub async fn main() -> anyhow::Result<()> {
    let app = App::from_args(std::env::args())?;
    app.run().await
}
