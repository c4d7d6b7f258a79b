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
//! The driver registry: a flat table of install slots plus the music, sound
//! and voice drivers, each of which may have one file loaded.

use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
};

use tracing::{debug, info, warn};

use crate::content::Content;

/// Number of install slots shared by every driver.
pub const INSTALL_SLOTS: usize = 16;

/// Every driver can fall back to this extension.
pub const FALLBACK_EXTENSION: &str = "XMI";

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("{kind} driver is not installed")]
    NotInstalled { kind: DriverKind },

    #[error("no file found for {name} ({kind} driver)")]
    NotFound { kind: DriverKind, name: String },

    #[error("unable to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// The three logical drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Music,
    Sound,
    Voice,
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Music => write!(f, "music"),
            DriverKind::Sound => write!(f, "sound"),
            DriverKind::Voice => write!(f, "voice"),
        }
    }
}

/// One logical driver and the file bound to it.
#[derive(Debug, Default)]
pub struct Driver {
    index: Option<usize>,
    extension: String,
    content: Option<Content>,
    filename: Option<PathBuf>,
    owned: bool,
}

impl Driver {
    /// Returns the install slot, if installed.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// Returns a handle to the loaded content.
    pub fn content(&self) -> Option<Content> {
        self.content.clone()
    }

    /// Returns the resolved path of the loaded file.
    pub fn filename(&self) -> Option<&Path> {
        self.filename.as_deref()
    }

    /// Returns true if this driver read the content itself rather than
    /// borrowing another driver's.
    pub fn owns_content(&self) -> bool {
        self.owned
    }

    fn clear(&mut self) {
        self.content = None;
        self.filename = None;
        self.owned = false;
    }
}

/// Owns the install table and the three logical drivers.
#[derive(Debug)]
pub struct DriverRegistry {
    installed: u16,
    search_paths: Vec<PathBuf>,
    music: Driver,
    sound: Driver,
    voice: Driver,
}

impl DriverRegistry {
    /// Creates a registry that resolves files against the given directories,
    /// in order.
    pub fn new(search_paths: Vec<PathBuf>) -> DriverRegistry {
        DriverRegistry {
            installed: 0,
            search_paths,
            music: Driver::default(),
            sound: Driver::default(),
            voice: Driver::default(),
        }
    }

    /// Claims the first free install slot. Returns None once all are taken.
    pub fn install(&mut self) -> Option<usize> {
        let index = (0..INSTALL_SLOTS).find(|index| self.installed & (1 << index) == 0)?;
        self.installed |= 1 << index;
        Some(index)
    }

    /// Frees an install slot. Freeing a free slot does nothing.
    pub fn uninstall(&mut self, index: usize) {
        if index < INSTALL_SLOTS {
            self.installed &= !(1 << index);
        }
    }

    /// Returns true if the install slot is taken.
    pub fn is_installed(&self, index: usize) -> bool {
        index < INSTALL_SLOTS && self.installed & (1 << index) != 0
    }

    /// Installs a logical driver with the extension it prefers for files. A
    /// driver that is already installed keeps its slot.
    pub fn install_driver(&mut self, kind: DriverKind, extension: &str) -> Option<usize> {
        if let Some(index) = self.driver(kind).index {
            return Some(index);
        }
        let Some(index) = self.install() else {
            warn!(driver = %kind, "No free driver slot.");
            return None;
        };

        let driver = self.driver_mut(kind);
        driver.index = Some(index);
        driver.extension = extension.to_string();
        info!(driver = %kind, index, extension, "Installed driver.");
        Some(index)
    }

    /// Unloads a logical driver's file and frees its install slot.
    pub fn uninstall_driver(&mut self, kind: DriverKind) {
        self.unload_file(kind);
        if let Some(index) = self.driver_mut(kind).index.take() {
            self.uninstall(index);
            info!(driver = %kind, index, "Uninstalled driver.");
        }
    }

    pub fn driver(&self, kind: DriverKind) -> &Driver {
        match kind {
            DriverKind::Music => &self.music,
            DriverKind::Sound => &self.sound,
            DriverKind::Voice => &self.voice,
        }
    }

    fn driver_mut(&mut self, kind: DriverKind) -> &mut Driver {
        match kind {
            DriverKind::Music => &mut self.music,
            DriverKind::Sound => &mut self.sound,
            DriverKind::Voice => &mut self.voice,
        }
    }

    /// Returns the content loaded into a driver.
    pub fn content(&self, kind: DriverKind) -> Option<Content> {
        self.driver(kind).content()
    }

    /// Finds the file for a name, trying the driver's extension and then the
    /// fallback extension in every search path. A name that already carries
    /// an extension is tried as given first.
    pub fn resolve(&self, kind: DriverKind, name: &str) -> Option<PathBuf> {
        let extension = self.driver(kind).extension.as_str();
        let mut candidates = Vec::new();
        if Path::new(name).extension().is_some() {
            candidates.push(name.to_string());
        }
        for extension in [extension, FALLBACK_EXTENSION] {
            if extension.is_empty() {
                continue;
            }
            candidates.push(format!("{}.{}", name, extension.to_ascii_uppercase()));
            candidates.push(format!("{}.{}", name, extension.to_ascii_lowercase()));
        }

        self.search_paths
            .iter()
            .flat_map(|dir| candidates.iter().map(move |candidate| dir.join(candidate)))
            .find(|path| path.is_file())
    }

    /// Reads a file with a driver's resolution rules without binding it.
    pub fn read_file(&self, kind: DriverKind, name: &str) -> Result<Content, DriverError> {
        if self.driver(kind).index.is_none() {
            return Err(DriverError::NotInstalled { kind });
        }
        let path = self.resolve(kind, name).ok_or_else(|| DriverError::NotFound {
            kind,
            name: name.to_string(),
        })?;
        let bytes = fs::read(&path).map_err(|source| DriverError::Io {
            path: path.clone(),
            source,
        })?;
        debug!(driver = %kind, path = ?path, size = bytes.len(), "Read file.");
        Ok(Content::new(bytes))
    }

    /// Loads a file into a driver, replacing whatever it held.
    pub fn load_file(&mut self, kind: DriverKind, name: &str) -> Result<(), DriverError> {
        self.unload_file(kind);
        if self.driver(kind).index.is_none() {
            return Err(DriverError::NotInstalled { kind });
        }
        let path = self.resolve(kind, name).ok_or_else(|| DriverError::NotFound {
            kind,
            name: name.to_string(),
        })?;
        let bytes = fs::read(&path).map_err(|source| DriverError::Io {
            path: path.clone(),
            source,
        })?;

        info!(driver = %kind, path = ?path, size = bytes.len(), "Loaded file.");
        let driver = self.driver_mut(kind);
        driver.content = Some(Content::new(bytes));
        driver.filename = Some(path);
        driver.owned = true;
        Ok(())
    }

    /// Releases a driver's file. Safe to call on a driver with nothing loaded.
    pub fn unload_file(&mut self, kind: DriverKind) {
        let driver = self.driver_mut(kind);
        if driver.owned {
            debug!(driver = %kind, path = ?driver.filename, "Released file.");
        }
        driver.clear();
    }

    /// Loads a file into the sound driver. When the sound and music drivers
    /// name the same file, the sound driver borrows the music driver's
    /// content instead of reading it again.
    pub fn load_sound_file(&mut self, name: &str) -> Result<(), DriverError> {
        let aliased = match (&self.sound.content, &self.music.content) {
            (Some(sound), Some(music)) => sound.same_buffer(music),
            _ => false,
        };
        if aliased {
            // Detach without touching the music driver's copy.
            self.sound.clear();
        } else {
            self.unload_file(DriverKind::Sound);
        }

        if self.sound.index.is_some() {
            if let (Some(music_path), Some(path)) = (
                self.music.filename.as_deref(),
                self.resolve(DriverKind::Sound, name),
            ) {
                if same_filename(music_path, &path) {
                    info!(path = ?path, "Sharing music file with the sound driver.");
                    self.sound.content = self.music.content.clone();
                    self.sound.filename = Some(path);
                    self.sound.owned = false;
                    return Ok(());
                }
            }
        }

        self.load_file(DriverKind::Sound, name)
    }

    /// Unloads every driver and frees every install slot.
    pub fn uninstall_all(&mut self) {
        for kind in [DriverKind::Sound, DriverKind::Music, DriverKind::Voice] {
            self.uninstall_driver(kind);
        }
        self.installed = 0;
    }
}

fn same_filename(a: &Path, b: &Path) -> bool {
    a.to_string_lossy()
        .eq_ignore_ascii_case(&b.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn registry(dir: &Path) -> DriverRegistry {
        let mut registry = DriverRegistry::new(vec![dir.to_path_buf()]);
        registry.install_driver(DriverKind::Music, "XMI");
        registry.install_driver(DriverKind::Sound, "XMI");
        registry.install_driver(DriverKind::Voice, "VOC");
        registry
    }

    #[test]
    fn test_install_slots() {
        let mut registry = DriverRegistry::new(Vec::new());
        for expected in 0..INSTALL_SLOTS {
            assert_eq!(registry.install(), Some(expected));
        }
        assert_eq!(registry.install(), None);

        registry.uninstall(5);
        assert!(!registry.is_installed(5));
        assert_eq!(registry.install(), Some(5));
        assert_eq!(registry.install(), None);

        // Out of range and repeated frees are harmless.
        registry.uninstall(99);
        registry.uninstall(3);
        registry.uninstall(3);
        assert_eq!(registry.install(), Some(3));
    }

    #[test]
    fn test_install_driver() {
        let mut registry = DriverRegistry::new(Vec::new());
        assert_eq!(registry.install_driver(DriverKind::Music, "XMI"), Some(0));
        assert_eq!(registry.install_driver(DriverKind::Music, "XMI"), Some(0));
        assert_eq!(registry.install_driver(DriverKind::Voice, "VOC"), Some(1));
        assert_eq!(registry.driver(DriverKind::Voice).extension(), "VOC");

        registry.uninstall_driver(DriverKind::Music);
        assert_eq!(registry.driver(DriverKind::Music).index(), None);
        assert!(!registry.is_installed(0));
        assert_eq!(registry.install_driver(DriverKind::Sound, "XMI"), Some(0));
    }

    #[test]
    fn test_install_driver_when_full() {
        let mut registry = DriverRegistry::new(Vec::new());
        while registry.install().is_some() {}
        assert_eq!(registry.install_driver(DriverKind::Music, "XMI"), None);
        assert_eq!(registry.driver(DriverKind::Music).index(), None);
    }

    #[test]
    fn test_resolve_prefers_driver_extension() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("DUNE1.ADL"), [1])?;
        fs::write(dir.path().join("DUNE1.XMI"), [2])?;
        fs::write(dir.path().join("dune2.xmi"), [3])?;

        let mut registry = DriverRegistry::new(vec![dir.path().to_path_buf()]);
        registry.install_driver(DriverKind::Music, "adl");

        assert_eq!(
            registry.resolve(DriverKind::Music, "DUNE1"),
            Some(dir.path().join("DUNE1.ADL"))
        );
        assert_eq!(
            registry.resolve(DriverKind::Music, "dune2"),
            Some(dir.path().join("dune2.xmi"))
        );
        assert_eq!(
            registry.resolve(DriverKind::Music, "DUNE1.XMI"),
            Some(dir.path().join("DUNE1.XMI"))
        );
        assert_eq!(registry.resolve(DriverKind::Music, "DUNE3"), None);
        Ok(())
    }

    #[test]
    fn test_resolve_walks_search_paths() -> Result<(), Box<dyn std::error::Error>> {
        let first = tempfile::tempdir()?;
        let second = tempfile::tempdir()?;
        fs::write(second.path().join("INTRO.XMI"), [1])?;

        let mut registry = DriverRegistry::new(vec![
            first.path().to_path_buf(),
            second.path().to_path_buf(),
        ]);
        registry.install_driver(DriverKind::Music, "XMI");
        assert_eq!(
            registry.resolve(DriverKind::Music, "INTRO"),
            Some(second.path().join("INTRO.XMI"))
        );
        Ok(())
    }

    #[test]
    fn test_load_and_unload() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("DUNE1.XMI"), [1, 2, 3])?;
        let mut registry = registry(dir.path());

        registry.load_file(DriverKind::Music, "DUNE1")?;
        let music = registry.driver(DriverKind::Music);
        assert!(music.owns_content());
        assert_eq!(music.filename(), Some(dir.path().join("DUNE1.XMI").as_path()));
        assert_eq!(*registry.content(DriverKind::Music).unwrap().read(), vec![1, 2, 3]);

        registry.unload_file(DriverKind::Music);
        registry.unload_file(DriverKind::Music);
        let music = registry.driver(DriverKind::Music);
        assert!(music.content().is_none());
        assert!(music.filename().is_none());
        assert!(!music.owns_content());
        Ok(())
    }

    #[test]
    fn test_load_errors() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("DUNE1.XMI"), [1])?;
        let mut registry = registry(dir.path());

        assert!(matches!(
            registry.load_file(DriverKind::Music, "MISSING"),
            Err(DriverError::NotFound { kind: DriverKind::Music, .. })
        ));

        registry.uninstall_driver(DriverKind::Music);
        assert!(matches!(
            registry.load_file(DriverKind::Music, "DUNE1"),
            Err(DriverError::NotInstalled { kind: DriverKind::Music })
        ));
        Ok(())
    }

    #[test]
    fn test_failed_load_unloads_previous() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("DUNE1.XMI"), [1])?;
        let mut registry = registry(dir.path());

        registry.load_file(DriverKind::Music, "DUNE1")?;
        assert!(registry.load_file(DriverKind::Music, "MISSING").is_err());
        assert!(registry.content(DriverKind::Music).is_none());
        Ok(())
    }

    #[test]
    fn test_sound_shares_music_file() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("FOO.XMI"), [1, 2, 3])?;
        let mut registry = registry(dir.path());

        registry.load_file(DriverKind::Music, "FOO")?;
        registry.load_sound_file("FOO")?;

        let music = registry.content(DriverKind::Music).unwrap();
        let sound = registry.content(DriverKind::Sound).unwrap();
        assert!(music.same_buffer(&sound));
        assert!(!registry.driver(DriverKind::Sound).owns_content());

        music.write()[0] = 9;
        assert_eq!(sound.read()[0], 9);
        Ok(())
    }

    #[test]
    fn test_sound_detaches_from_music() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("FOO.XMI"), [1])?;
        fs::write(dir.path().join("BAR.XMI"), [2])?;
        let mut registry = registry(dir.path());

        registry.load_file(DriverKind::Music, "FOO")?;
        registry.load_sound_file("FOO")?;
        registry.load_sound_file("BAR")?;

        let music = registry.content(DriverKind::Music).unwrap();
        let sound = registry.content(DriverKind::Sound).unwrap();
        assert!(!music.same_buffer(&sound));
        assert!(registry.driver(DriverKind::Sound).owns_content());
        assert_eq!(*music.read(), vec![1]);
        assert_eq!(*sound.read(), vec![2]);
        Ok(())
    }

    #[test]
    fn test_sound_without_music_loads_independently() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("FOO.XMI"), [1])?;
        let mut registry = registry(dir.path());

        registry.load_sound_file("FOO")?;
        assert!(registry.driver(DriverKind::Sound).owns_content());

        registry.load_file(DriverKind::Music, "FOO")?;
        let music = registry.content(DriverKind::Music).unwrap();
        let sound = registry.content(DriverKind::Sound).unwrap();
        assert!(!music.same_buffer(&sound));
        Ok(())
    }

    #[test]
    fn test_read_file_does_not_bind() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("VOICE.VOC"), [7])?;
        let registry = registry(dir.path());

        let content = registry.read_file(DriverKind::Voice, "VOICE")?;
        assert_eq!(*content.read(), vec![7]);
        assert!(registry.content(DriverKind::Voice).is_none());
        Ok(())
    }

    #[test]
    fn test_uninstall_all() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("FOO.XMI"), [1])?;
        let mut registry = registry(dir.path());
        registry.load_file(DriverKind::Music, "FOO")?;

        registry.uninstall_all();
        assert!(registry.content(DriverKind::Music).is_none());
        assert!((0..INSTALL_SLOTS).all(|index| !registry.is_installed(index)));
        Ok(())
    }
}
