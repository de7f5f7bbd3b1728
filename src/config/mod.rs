//! Configuration management for Push2 GW
//!
//! Loads and validates the YAML configuration file. Every section is
//! optional; missing fields fall back to the defaults below.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use tokio::fs;

use crate::geometry::Rect;
use crate::led::{palette, LedColors, Rgb};
use crate::scheduler::FrameSettings;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub frame: FrameConfig,
    #[serde(default)]
    pub pads: PadsConfig,
    #[serde(default)]
    pub colors: LedColors,
}

/// MIDI port configuration
///
/// Port names are matched as case-insensitive substrings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MidiConfig {
    #[serde(default = "default_port")]
    pub input_port: String,
    #[serde(default = "default_port")]
    pub output_port: String,
    /// Port receiving the pad notes, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note_output: Option<String>,
}

impl Default for MidiConfig {
    fn default() -> Self {
        Self {
            input_port: default_port(),
            output_port: default_port(),
            note_output: None,
        }
    }
}

/// Render loop and canvas placement
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FrameConfig {
    #[serde(default = "default_rate")]
    pub rate_hz: u32,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_dest_x")]
    pub dest_x: i32,
    #[serde(default)]
    pub dest_y: i32,
    /// Write display frames to this PNG instead of the device display
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot_path: Option<PathBuf>,
    #[serde(default = "default_snapshot_every")]
    pub snapshot_every: u64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            rate_hz: default_rate(),
            width: default_width(),
            height: default_height(),
            dest_x: default_dest_x(),
            dest_y: 0,
            snapshot_path: None,
            snapshot_every: default_snapshot_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PadsConfig {
    #[serde(default = "default_banks")]
    pub banks: Vec<PadBankConfig>,
}

impl Default for PadsConfig {
    fn default() -> Self {
        Self {
            banks: default_banks(),
        }
    }
}

/// Note offset and accent colour of one pad bank
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PadBankConfig {
    pub bank: u8,
    pub note_offset: i32,
    #[serde(default = "default_pad_color")]
    pub color: Rgb,
}

impl AppConfig {
    /// Load configuration from file with validation
    pub async fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: AppConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML config: {}", path))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration for correctness and consistency
    pub fn validate(&self) -> Result<()> {
        if self.midi.input_port.is_empty() {
            anyhow::bail!("MIDI input_port cannot be empty");
        }
        if self.midi.output_port.is_empty() {
            anyhow::bail!("MIDI output_port cannot be empty");
        }
        if matches!(&self.midi.note_output, Some(port) if port.is_empty()) {
            anyhow::bail!("MIDI note_output cannot be empty when set");
        }

        if self.frame.rate_hz == 0 {
            anyhow::bail!("frame.rate_hz must be greater than 0");
        }
        if self.frame.width == 0 || self.frame.height == 0 {
            anyhow::bail!(
                "frame canvas {}x{} must not be empty",
                self.frame.width,
                self.frame.height
            );
        }

        let mut seen = HashSet::new();
        for bank in &self.pads.banks {
            if !seen.insert(bank.bank) {
                anyhow::bail!("Pad bank {} is defined more than once", bank.bank);
            }
        }

        Ok(())
    }

    /// Scheduler settings derived from the frame section
    pub fn frame_settings(&self) -> FrameSettings {
        FrameSettings {
            rate_hz: self.frame.rate_hz,
            dest: Rect::new(
                self.frame.dest_x,
                self.frame.dest_y,
                self.frame.width,
                self.frame.height,
            ),
        }
    }
}

// Default value functions
fn default_port() -> String { "Ableton Push 2".to_string() }
fn default_rate() -> u32 { 60 }
fn default_width() -> u32 { 320 }
fn default_height() -> u32 { 240 }
fn default_dest_x() -> i32 { 100 }
fn default_snapshot_every() -> u64 { 60 }
fn default_pad_color() -> Rgb { palette::BLUE }
fn default_banks() -> Vec<PadBankConfig> {
    vec![PadBankConfig {
        bank: 0,
        note_offset: 60,
        color: default_pad_color(),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.midi.input_port, "Ableton Push 2");
        assert_eq!(config.frame.rate_hz, 60);
        assert_eq!(config.pads.banks.len(), 1);
        assert_eq!(config.pads.banks[0].note_offset, 60);
        assert_eq!(config.colors.button_active, palette::RED);
        assert!(config.validate().is_ok());

        let settings = config.frame_settings();
        assert_eq!(settings.dest, Rect::new(100, 0, 320, 240));
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(config.frame.width, 320);
        assert_eq!(config.pads.banks[0].color, palette::BLUE);
    }

    #[tokio::test]
    async fn test_load_full_config() {
        let file = write_config(
            r#"
midi:
  input_port: "push 2 live"
  output_port: "push 2 live"
  note_output: "loopMIDI"
frame:
  rate_hz: 30
  width: 200
  height: 100
  dest_x: 10
  dest_y: 20
pads:
  banks:
    - { bank: 0, note_offset: 60, color: [0, 0, 255] }
    - { bank: 1, note_offset: 100 }
colors:
  button_active: [0, 255, 0]
"#,
        );

        let config = AppConfig::load(file.path().to_str().unwrap()).await.unwrap();
        assert_eq!(config.midi.note_output.as_deref(), Some("loopMIDI"));
        assert_eq!(config.frame.rate_hz, 30);
        assert_eq!(config.frame.snapshot_every, 60);
        assert_eq!(config.pads.banks[1].note_offset, 100);
        assert_eq!(config.pads.banks[1].color, palette::BLUE);
        assert_eq!(config.colors.button_active, palette::GREEN);
        assert_eq!(config.colors.off, palette::BLACK);
        assert_eq!(config.frame_settings().dest, Rect::new(10, 20, 200, 100));
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.yaml");
        let err = AppConfig::load(path.to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[tokio::test]
    async fn test_invalid_yaml_is_error() {
        let file = write_config("frame: [not, a, map]");
        let err = AppConfig::load(file.path().to_str().unwrap()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML config"));
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.frame.rate_hz = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.frame.height = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pads.banks.push(PadBankConfig {
            bank: 0,
            note_offset: 100,
            color: palette::RED,
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));

        let mut config = AppConfig::default();
        config.midi.input_port.clear();
        assert!(config.validate().is_err());
    }
}
