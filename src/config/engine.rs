// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::{
    audio::Pcm,
    clock::Clock,
    driver::{Driver, Drivers},
    error::ConfigError,
    midi::Midi,
};

const DEFAULT_FADE_OUT: Duration = Duration::from_secs(2);

/// The configuration for the playback engine.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct Engine {
    /// The scheduler clock configuration.
    #[serde(default)]
    clock: Clock,
    /// The MIDI transport configuration.
    #[serde(default)]
    midi: Midi,
    /// The PCM transport configuration.
    #[serde(default)]
    pcm: Pcm,
    /// The logical driver configuration.
    #[serde(default)]
    drivers: Drivers,
    /// Directories searched when resolving music, sound and voice files.
    search_paths: Option<Vec<String>>,
    /// How long a music fade out takes.
    fade_out: Option<String>,
}

impl Engine {
    /// Creates an engine configuration from its parts.
    pub fn new(clock: Clock, midi: Midi, pcm: Pcm, search_paths: Vec<PathBuf>) -> Engine {
        Engine {
            clock,
            midi,
            pcm,
            drivers: Drivers::new(
                Driver::new(true, "XMI"),
                Driver::new(true, "XMI"),
                Driver::new(true, "VOC"),
            ),
            search_paths: Some(
                search_paths
                    .iter()
                    .map(|path| path.to_string_lossy().into_owned())
                    .collect(),
            ),
            fade_out: None,
        }
    }

    /// Parses an engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<Engine, ConfigError> {
        let engine = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<Engine>()?;
        engine.validate()?;
        Ok(engine)
    }

    /// Checks the values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()?;
        self.fade_out()?;
        Ok(())
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn midi(&self) -> &Midi {
        &self.midi
    }

    pub fn pcm(&self) -> &Pcm {
        &self.pcm
    }

    pub fn drivers(&self) -> &Drivers {
        &self.drivers
    }

    /// Returns the search paths, defaulting to the working directory.
    pub fn search_paths(&self) -> Vec<PathBuf> {
        match &self.search_paths {
            Some(paths) if !paths.is_empty() => paths.iter().map(PathBuf::from).collect(),
            _ => vec![PathBuf::from(".")],
        }
    }

    /// Returns the music fade out duration.
    pub fn fade_out(&self) -> Result<Duration, ConfigError> {
        match &self.fade_out {
            Some(fade_out) => Ok(DurationString::from_string(fade_out.clone())?.into()),
            None => Ok(DEFAULT_FADE_OUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use config::FileFormat;

    use super::*;

    fn parse(yaml: &str) -> Engine {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_full_config() {
        let engine = parse(
            r#"
            clock:
              tick_rate: 240
              autostart: false
            midi:
              device: mock-midi
            pcm:
              device: mock-pcm
            drivers:
              music:
                extension: ADL
              voice:
                enabled: false
            search_paths:
              - data
              - /opt/game
            fade_out: 500ms
        "#,
        );

        assert_eq!(engine.clock().tick_rate(), 240);
        assert!(!engine.clock().autostart());
        assert_eq!(engine.clock().period(), Duration::from_micros(4166));
        assert_eq!(engine.midi().device(), "mock-midi");
        assert_eq!(engine.pcm().device(), "mock-pcm");
        assert_eq!(engine.drivers().music().extension_or("XMI"), "ADL");
        assert!(engine.drivers().music().enabled());
        assert_eq!(engine.drivers().sound().extension_or("XMI"), "XMI");
        assert!(!engine.drivers().voice().enabled());
        assert_eq!(
            engine.search_paths(),
            vec![PathBuf::from("data"), PathBuf::from("/opt/game")]
        );
        assert_eq!(engine.fade_out().unwrap(), Duration::from_millis(500));
        assert!(engine.validate().is_ok());
    }

    #[test]
    fn test_defaults() {
        let engine = parse("{}");

        assert_eq!(engine.clock().tick_rate(), 120);
        assert!(engine.clock().autostart());
        assert_eq!(engine.clock().period(), Duration::from_micros(8333));
        assert_eq!(engine.midi().device(), "none");
        assert_eq!(engine.pcm().device(), "default");
        assert!(engine.drivers().sound().enabled());
        assert_eq!(engine.search_paths(), vec![PathBuf::from(".")]);
        assert_eq!(engine.fade_out().unwrap(), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_tick_rate() {
        let engine = parse(
            r#"
            clock:
              tick_rate: 0
        "#,
        );
        assert!(matches!(engine.validate(), Err(ConfigError::TickRate(0))));
    }

    #[test]
    fn test_invalid_fade_out() {
        let engine = parse(r#"fade_out: "soon""#);
        assert!(matches!(engine.validate(), Err(ConfigError::Duration(_))));
    }

    #[test]
    fn test_deserialize_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("engine.yaml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "midi:\n  device: mock\nsearch_paths: [sounds]")?;

        let engine = Engine::deserialize(&path)?;
        assert_eq!(engine.midi().device(), "mock");
        assert_eq!(engine.search_paths(), vec![PathBuf::from("sounds")]);
        Ok(())
    }
}
