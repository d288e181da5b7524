// src/config.rs

//! Configuration loading entry points.

use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::Config;
use crate::pipeline::classify::classify;

/// Load, parse and fully validate a configuration file.
///
/// Structural validation covers what each source or technology can know in
/// isolation; classification is then run over every enabled scope so that
/// malformed extract paths and missing schedule intervals fail at load time
/// instead of on the first tick. Cycles are deliberately not load errors:
/// they are detected per scheduling pass and skip their scope only.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load(path)?;
    config.validate()?;
    validate_scopes(&config)?;
    log::info!(
        "Configuration loaded: {} enabled source(s)",
        config.enabled_source_count()
    );
    Ok(config)
}

fn validate_scopes(config: &Config) -> Result<()> {
    for (entity_name, entity) in &config.entities {
        for (tech_name, tech) in &entity.technologies {
            if !tech.enabled {
                continue;
            }
            let scope = format!("{entity_name}.{tech_name}");

            let classification = classify(&tech.sources)
                .map_err(|e| AppError::config(format!("{scope}: {e}")))?;

            for name in &classification.isolated {
                if tech.sources[name].interval.is_none() {
                    return Err(AppError::config(format!(
                        "{scope}: isolated source '{name}' has no interval"
                    )));
                }
                if tech.pagination.is_none() {
                    log::warn!(
                        "{scope}: source '{name}' is scheduled on its own but the \
                         technology has no pagination descriptor; every poll will fail"
                    );
                }
            }
        }
    }
    Ok(())
}
