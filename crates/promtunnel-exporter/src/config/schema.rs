use serde::Deserialize;
use promtunnel_core::error::{Result, TunnelError};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExporterConfig {
    pub version: u32,

    /// Raises the default log level to `debug` when `RUST_LOG` is unset.
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub metrics: MetricsSection,
}

impl ExporterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(TunnelError::UnsupportedVersion);
        }

        self.metrics.validate()?;

        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

impl MetricsSection {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TunnelError::BadConfig(
                "metrics.port must be between 1 and 65535".into(),
            ));
        }
        Ok(())
    }
}

fn default_port() -> u16 {
    9090
}
