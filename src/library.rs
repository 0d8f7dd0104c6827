use std::{
    error::Error,
    fmt, fs, io,
    path::{Component, Path, PathBuf},
};

use chrono::{DateTime, Local};
use tracing::{debug, info};

pub const SOUNDFONT_EXTENSION: &str = "sf2";
pub const MIDI_EXTENSION: &str = "mid";

#[derive(Debug)]
pub enum FileError {
    Io(io::Error),
    InvalidName(String),
    OutsideLibrary(PathBuf),
}

impl Error for FileError {}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FileError::Io(e) => write!(f, "File operation failed: {e}"),
            FileError::InvalidName(name) => write!(f, "Invalid file name: {name:?}"),
            FileError::OutsideLibrary(path) => write!(f, "Path outside library: {path:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFile {
    /// File name without extension.
    pub name: String,
    pub path: PathBuf,
}

/// The two media folders: soundfonts and MIDI files (played and recorded).
#[derive(Debug, Clone)]
pub struct Library {
    soundfont_dir: PathBuf,
    midi_dir: PathBuf,
}

impl Library {
    pub fn new(soundfont_dir: PathBuf, midi_dir: PathBuf) -> Self {
        Self {
            soundfont_dir,
            midi_dir,
        }
    }

    pub fn midi_dir(&self) -> &Path {
        &self.midi_dir
    }

    pub fn soundfonts(&self) -> Vec<MediaFile> {
        scan(&self.soundfont_dir, SOUNDFONT_EXTENSION)
    }

    pub fn midi_files(&self) -> Vec<MediaFile> {
        scan(&self.midi_dir, MIDI_EXTENSION)
    }

    /// Renames a MIDI file to `<new_name>.mid` in the MIDI folder.
    pub fn rename_midi(&self, from: &Path, new_name: &str) -> Result<PathBuf, FileError> {
        let name = new_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(FileError::InvalidName(new_name.into()));
        }
        self.check_within(from)?;
        let to = self.midi_dir.join(format!("{name}.{MIDI_EXTENSION}"));
        self.check_within(&to)?;
        fs::rename(from, &to).map_err(FileError::Io)?;
        info!("Renamed {from:?} to {to:?}");
        Ok(to)
    }

    pub fn delete_midi(&self, path: &Path) -> Result<(), FileError> {
        self.check_within(path)?;
        fs::remove_file(path).map_err(FileError::Io)?;
        info!("Deleted {path:?}");
        Ok(())
    }

    /// `rec_HHMMSS.mid` in the MIDI folder, stamped with local time.
    pub fn recording_path(&self, now: DateTime<Local>) -> PathBuf {
        self.midi_dir
            .join(format!("rec_{}.{MIDI_EXTENSION}", now.format("%H%M%S")))
    }

    fn check_within(&self, path: &Path) -> Result<(), FileError> {
        if is_path_within_base(path, &self.midi_dir) {
            Ok(())
        } else {
            Err(FileError::OutsideLibrary(path.to_owned()))
        }
    }
}

/// Files with the given extension, sorted by file name. A missing or
/// unreadable folder yields an empty list.
fn scan(dir: &Path, extension: &str) -> Vec<MediaFile> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot scan {dir:?}: {e}");
            return vec![];
        }
    };
    let mut files: Vec<(String, MediaFile)> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let path = entry.path();
            if path.extension()? != extension {
                return None;
            }
            let file_name = path.file_name()?.to_string_lossy().into_owned();
            let name = path.file_stem()?.to_string_lossy().into_owned();
            Some((file_name, MediaFile { name, path }))
        })
        .collect();
    files.sort_by(|a, b| a.0.cmp(&b.0));
    files.into_iter().map(|(_, file)| file).collect()
}

pub fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut test_path = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if !test_path.pop() {
                    return None;
                }
            }
            Component::CurDir => {}
            _ => test_path.push(component.as_os_str()),
        }
    }
    Some(test_path)
}

pub fn is_path_within_base(path: &Path, base: &Path) -> bool {
    if let (Some(norm_path), Some(norm_base)) = (normalize_path(path), normalize_path(base)) {
        norm_path.starts_with(norm_base)
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn library(dir: &Path) -> Library {
        let sf = dir.join("sf2");
        let mid = dir.join("midifiles");
        fs::create_dir_all(&sf).unwrap();
        fs::create_dir_all(&mid).unwrap();
        Library::new(sf, mid)
    }

    #[test]
    fn scans_sorted_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        for name in ["b.sf2", "a.sf2", "notes.txt", "c.SF2x"] {
            fs::write(dir.path().join("sf2").join(name), b"").unwrap();
        }
        fs::write(lib.midi_dir().join("song.mid"), b"").unwrap();
        fs::create_dir(lib.midi_dir().join("dir.mid")).unwrap();

        let names: Vec<String> = lib.soundfonts().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["a", "b"]);
        let midi = lib.midi_files();
        assert_eq!(midi.len(), 1);
        assert_eq!(midi[0].name, "song");
    }

    #[test]
    fn missing_folder_is_empty() {
        let lib = Library::new("/nonexistent/sf2".into(), "/nonexistent/mid".into());
        assert!(lib.soundfonts().is_empty());
        assert!(lib.midi_files().is_empty());
    }

    #[test]
    fn rename_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        let from = lib.midi_dir().join("rec_101010.mid");
        fs::write(&from, b"x").unwrap();

        let to = lib.rename_midi(&from, "  Take_1 ").unwrap();
        assert_eq!(to, lib.midi_dir().join("Take_1.mid"));
        assert!(!from.exists());
        assert!(to.exists());

        assert!(matches!(
            lib.rename_midi(&to, "   "),
            Err(FileError::InvalidName(_))
        ));
        assert!(matches!(
            lib.rename_midi(&to, "../escape"),
            Err(FileError::InvalidName(_))
        ));

        lib.delete_midi(&to).unwrap();
        assert!(!to.exists());
        assert!(matches!(lib.delete_midi(&to), Err(FileError::Io(_))));
    }

    #[test]
    fn refuses_paths_outside_midi_folder() {
        let dir = tempfile::tempdir().unwrap();
        let lib = library(dir.path());
        let outside = lib.midi_dir().join("../sf2/a.sf2");
        assert!(matches!(
            lib.delete_midi(&outside),
            Err(FileError::OutsideLibrary(_))
        ));
    }

    #[test]
    fn recording_name_uses_time_of_day() {
        let lib = Library::new("sf2".into(), "mid".into());
        let now = Local.with_ymd_and_hms(2024, 5, 1, 9, 5, 7).unwrap();
        assert_eq!(lib.recording_path(now), Path::new("mid/rec_090507.mid"));
    }

    #[test]
    fn within_base() {
        assert!(is_path_within_base(Path::new("/a/b/c"), Path::new("/a/b")));
        assert!(!is_path_within_base(Path::new("/a/b/../c"), Path::new("/a/b")));
        assert!(!is_path_within_base(Path::new("../x"), Path::new("x")));
    }
}
