//! Layered configuration loading.
//!
//! Layers, lowest priority first:
//! 1. Compiled-in defaults ([`PipelineConfig::default`])
//! 2. TOML file (if provided)
//! 3. Environment overrides with prefix `SEQPREP_`, nested with `__`
//!    (e.g. `SEQPREP_LABELING__HORIZON=3`)

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use config::{Config, Environment, File};
use tracing::{debug, info};

use super::settings::PipelineConfig;

pub const ENV_PREFIX: &str = "SEQPREP";

impl PipelineConfig {
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let defaults = Config::try_from(&PipelineConfig::default())
            .context("failed to serialize default configuration")?;
        let mut builder = Config::builder().add_source(defaults);

        if let Some(path) = config_path {
            let path_str = path.to_str().context("config path is not valid UTF-8")?;
            builder = builder.add_source(File::with_name(path_str).required(true));
            debug!("Reading pipeline config from {}", path.display());
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let cfg: PipelineConfig = builder
            .build()
            .context("failed to build configuration")?
            .try_deserialize()
            .context("failed to deserialize configuration")?;

        cfg.validate()
            .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;

        info!(
            "Config loaded: sequence_length={}, horizon={}, ewma_span={}, z=({}, {}), normalize={}, scale={}",
            cfg.windowing.sequence_length,
            cfg.labeling.horizon,
            cfg.labeling.ewma_span,
            cfg.labeling.z_mild,
            cfg.labeling.z_strong,
            cfg.normalization.enabled,
            cfg.scaling.enabled
        );

        Ok(cfg)
    }

    /// Parses a TOML document on top of the defaults, without environment overrides.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(content).context("failed to parse TOML configuration")?;
        cfg.validate()
            .map_err(|errors| anyhow!("invalid configuration: {}", errors.join(", ")))?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScalerMethod;
    use crate::types::ColumnRole;
    use std::io::Write;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner())
    }

    const SAMPLE: &str = r#"
[windowing]
sequence_length = 40

[labeling]
horizon = 3
ewma_span = 10
entry_price_column = "GBPUSD_open_price__ask_level_1"
exit_price_column = "GBPUSD_close_price__bid_level_1"

[columns]
features = [
    { name = "GBPUSD_open_price__ask_level_1" },
    { name = "GBPUSD_close_price__bid_level_1" },
    { name = "GBPUSD_spr", role = "ratio" },
    { name = "hour_of_the_day" },
]
cyclical = [{ column = "hour_of_the_day", period = 24.0 }]

[scaling]
method = "standard"
log1p = ["GBPUSD_spr"]

[sanity]
abs_max = [{ column = "GBPUSD_spr", limit = 25.0 }]
"#;

    fn write_temp_toml(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("create temp file");
        write!(f, "{}", content).expect("write temp file");
        f
    }

    #[test]
    fn test_load_defaults_only() {
        let _lock = lock_env();
        std::env::remove_var("SEQPREP_LABELING__HORIZON");

        let cfg = PipelineConfig::load(None).expect("load defaults");
        assert_eq!(cfg.windowing.sequence_length, 47);
        assert_eq!(cfg.labeling.horizon, 5);
        assert_eq!(cfg.scaling.method, ScalerMethod::Robust);
        assert_eq!(cfg.sanity.abs_max_global, 7.0);
    }

    #[test]
    fn test_load_from_toml() {
        let _lock = lock_env();
        std::env::remove_var("SEQPREP_LABELING__HORIZON");

        let file = write_temp_toml(SAMPLE);
        let cfg = PipelineConfig::load(Some(file.path())).expect("load toml");
        assert_eq!(cfg.windowing.sequence_length, 40);
        assert_eq!(cfg.labeling.horizon, 3);
        assert_eq!(cfg.labeling.z_strong, 1.7);
        assert_eq!(cfg.columns.features.len(), 4);
        assert_eq!(cfg.columns.features[2].role, ColumnRole::Ratio);
        assert_eq!(cfg.columns.features[0].name, "GBPUSD_open_price__ask_level_1");
        assert_eq!(cfg.scaling.method, ScalerMethod::Standard);
        assert_eq!(cfg.sanity.abs_max[0].limit, 25.0);
    }

    #[test]
    fn test_env_override() {
        let _lock = lock_env();
        std::env::set_var("SEQPREP_LABELING__HORIZON", "4");

        let file = write_temp_toml(SAMPLE);
        let cfg = PipelineConfig::load(Some(file.path()));
        std::env::remove_var("SEQPREP_LABELING__HORIZON");

        assert_eq!(cfg.expect("load with env").labeling.horizon, 4);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let _lock = lock_env();
        let file = write_temp_toml("[labeling]\nz_mild = 3.0\n");
        let err = PipelineConfig::load(Some(file.path())).unwrap_err();
        assert!(err.to_string().contains("z_mild"));
    }

    #[test]
    fn test_from_toml_str() {
        let cfg = PipelineConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(cfg.columns.cyclical[0].period, 24.0);
        assert_eq!(cfg.scaling.log1p, vec!["GBPUSD_spr".to_string()]);
    }
}
