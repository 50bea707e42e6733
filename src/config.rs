use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::BarcodeFormat;

const DEFAULT_AUTOSTART: bool = true;
const DEFAULT_SCAN_DELAY_MS: u64 = 500;

#[derive(Debug, Deserialize, Default)]
struct ScanConfigFile {
    autostart: Option<bool>,
    scan_delay_ms: Option<u64>,
    device_id: Option<String>,
    hints: Option<DecodeHintsFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DecodeHintsFile {
    formats: Option<Vec<String>>,
    try_harder: Option<bool>,
}

/// Decoder hints forwarded to the decode engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeHints {
    pub formats: Vec<BarcodeFormat>,
    pub try_harder: bool,
}

impl Default for DecodeHints {
    fn default() -> Self {
        Self {
            formats: vec![BarcodeFormat::QrCode],
            try_harder: false,
        }
    }
}

impl DecodeHints {
    pub fn validate(&self) -> Result<()> {
        if self.formats.is_empty() {
            return Err(anyhow!("format allow-list must not be empty"));
        }
        for (index, format) in self.formats.iter().enumerate() {
            if self.formats[..index].contains(format) {
                return Err(anyhow!("duplicate format in allow-list: {}", format));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub autostart: bool,
    /// Delay between a successful decode and the next attempt. Failures
    /// reschedule immediately regardless.
    pub scan_delay: Duration,
    pub device_id: Option<String>,
    pub hints: DecodeHints,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            autostart: DEFAULT_AUTOSTART,
            scan_delay: Duration::from_millis(DEFAULT_SCAN_DELAY_MS),
            device_id: None,
            hints: DecodeHints::default(),
        }
    }
}

impl ScanConfig {
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("SCAN_SESSION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ScanConfigFile) -> Result<Self> {
        let autostart = file.autostart.unwrap_or(DEFAULT_AUTOSTART);
        let scan_delay =
            Duration::from_millis(file.scan_delay_ms.unwrap_or(DEFAULT_SCAN_DELAY_MS));
        let device_id = file.device_id.filter(|id| !id.trim().is_empty());
        let hints = match file.hints {
            Some(hints) => DecodeHints {
                formats: match hints.formats {
                    Some(names) => parse_formats(&names)?,
                    None => DecodeHints::default().formats,
                },
                try_harder: hints.try_harder.unwrap_or(false),
            },
            None => DecodeHints::default(),
        };
        Ok(Self {
            autostart,
            scan_delay,
            device_id,
            hints,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(delay) = std::env::var("SCAN_SESSION_DELAY_MS") {
            let millis: u64 = delay.parse().map_err(|_| {
                anyhow!("SCAN_SESSION_DELAY_MS must be an integer number of milliseconds")
            })?;
            self.scan_delay = Duration::from_millis(millis);
        }
        if let Ok(device) = std::env::var("SCAN_SESSION_DEVICE") {
            if !device.trim().is_empty() {
                self.device_id = Some(device);
            }
        }
        if let Ok(formats) = std::env::var("SCAN_SESSION_FORMATS") {
            let names = split_csv(&formats);
            if !names.is_empty() {
                self.hints.formats = parse_formats(&names)?;
            }
        }
        if let Ok(try_harder) = std::env::var("SCAN_SESSION_TRY_HARDER") {
            self.hints.try_harder = parse_bool("SCAN_SESSION_TRY_HARDER", &try_harder)?;
        }
        if let Ok(autostart) = std::env::var("SCAN_SESSION_AUTOSTART") {
            self.autostart = parse_bool("SCAN_SESSION_AUTOSTART", &autostart)?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        self.hints.validate()
    }
}

fn read_config_file(path: &Path) -> Result<ScanConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn parse_formats(names: &[String]) -> Result<Vec<BarcodeFormat>> {
    names.iter().map(|name| name.parse()).collect()
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(anyhow!("{} must be a boolean, got {:?}", name, other)),
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_scan_only_qr_with_half_second_delay() -> Result<()> {
        let cfg = ScanConfig::from_file(ScanConfigFile::default())?;
        assert!(cfg.autostart);
        assert_eq!(cfg.scan_delay, Duration::from_millis(500));
        assert_eq!(cfg.device_id, None);
        assert_eq!(cfg.hints.formats, vec![BarcodeFormat::QrCode]);
        assert!(!cfg.hints.try_harder);
        cfg.validate()
    }

    #[test]
    fn config_file_overrides_every_default() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            r#"{{
                "autostart": false,
                "scan_delay_ms": 120,
                "device_id": "dev-1",
                "hints": {{ "formats": ["qr_code", "ean-13"], "try_harder": true }}
            }}"#
        )?;
        let cfg = ScanConfig::from_file(read_config_file(file.path())?)?;
        assert!(!cfg.autostart);
        assert_eq!(cfg.scan_delay, Duration::from_millis(120));
        assert_eq!(cfg.device_id, Some("dev-1".into()));
        assert_eq!(
            cfg.hints.formats,
            vec![BarcodeFormat::QrCode, BarcodeFormat::Ean13]
        );
        assert!(cfg.hints.try_harder);
        Ok(())
    }

    #[test]
    fn unknown_format_name_is_rejected() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, r#"{{ "hints": {{ "formats": ["qr_kode"] }} }}"#)?;
        let result = ScanConfig::from_file(read_config_file(file.path())?);
        assert!(result.is_err());
        Ok(())
    }

    #[test]
    fn empty_format_list_fails_validation() {
        let hints = DecodeHints {
            formats: Vec::new(),
            try_harder: false,
        };
        assert!(hints.validate().is_err());
    }

    #[test]
    fn duplicate_formats_fail_validation() {
        let hints = DecodeHints {
            formats: vec![BarcodeFormat::QrCode, BarcodeFormat::QrCode],
            try_harder: false,
        };
        assert!(hints.validate().is_err());
    }

    #[test]
    fn blank_device_id_in_file_is_treated_as_unset() -> Result<()> {
        let cfg = ScanConfig::from_file(ScanConfigFile {
            device_id: Some("   ".into()),
            ..ScanConfigFile::default()
        })?;
        assert_eq!(cfg.device_id, None);
        Ok(())
    }

    #[test]
    fn booleans_parse_common_spellings() -> Result<()> {
        assert!(parse_bool("X", "1")?);
        assert!(parse_bool("X", "true")?);
        assert!(!parse_bool("X", "0")?);
        assert!(!parse_bool("X", "False")?);
        assert!(parse_bool("X", "yes").is_err());
        Ok(())
    }
}
