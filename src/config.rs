use std::fs;
use std::path::Path;

use crate::cli::{FormatArg, RunArgs};
use crate::error::{Error, Result};
use crate::models::{ArrivalConfig, DeskConfig, FailurePolicy};

pub fn load_config(path: &Path) -> Result<DeskConfig> {
    let contents = read(path, "config")?;
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .unwrap_or("");

    match ext {
        "toml" => toml::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse TOML: {}", err))),
        "json" => serde_json::from_str(&contents)
            .map_err(|err| Error::ConfigParse(format!("failed to parse JSON: {}", err))),
        "" => Err(Error::UnsupportedConfigFormat("unknown".to_string())),
        _ => Err(Error::UnsupportedConfigFormat(ext.to_string())),
    }
}

/// Reads interarrival gaps in minutes, one per line. Blank lines and lines
/// starting with `#` are skipped.
pub fn load_interarrivals(path: &Path) -> Result<Vec<f64>> {
    let contents = read(path, "interarrivals")?;
    parse_interarrivals(&contents)
}

fn parse_interarrivals(contents: &str) -> Result<Vec<f64>> {
    let mut gaps = Vec::new();
    for (idx, line) in contents.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let gap: f64 = trimmed.parse().map_err(|_| {
            Error::ConfigParse(format!(
                "interarrivals line {}: '{}' is not a number",
                idx + 1,
                trimmed
            ))
        })?;
        gaps.push(gap);
    }
    if gaps.is_empty() {
        return Err(Error::InvalidArrivals("interarrivals file has no gaps".to_string()));
    }
    Ok(gaps)
}

fn read(path: &Path, what: &str) -> Result<String> {
    fs::read_to_string(path).map_err(|err| {
        Error::ConfigIo(format!(
            "failed to read {} '{}': {}",
            what,
            path.display(),
            err
        ))
    })
}

/// Loads the file named by `run` and applies the command-line overrides.
pub fn build_config(args: &RunArgs) -> Result<(DeskConfig, FormatArg)> {
    let mut config = load_config(&args.config)?;
    if let Some(count) = args.replications {
        config.replications.count = count;
    }
    if let Some(seed) = args.seed {
        config.replications.base_seed = seed;
    }
    if let Some(workers) = args.workers {
        config.replications.workers = Some(workers);
    }
    if args.abort_on_failure {
        config.replications.on_failure = FailurePolicy::Abort;
    }
    if let Some(path) = &args.interarrivals {
        config.arrivals = ArrivalConfig::Interarrivals {
            gaps: load_interarrivals(path)?,
            cycle: true,
        };
    }
    config.validate()?;
    Ok((config, args.format))
}
