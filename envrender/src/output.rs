use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Error};

/// Permission bits of the rendered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Largest accepted mode (permissions plus setuid, setgid and sticky).
    pub const MAX: u32 = 0o7777;

    #[cfg(test)]
    pub fn from_bits(bits: u32) -> FileMode {
        FileMode(bits & Self::MAX)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl FromStr for FileMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<FileMode, Error> {
        if s.is_empty() || !s.bytes().all(|c| (b'0'..=b'7').contains(&c)) {
            bail!("'{}' is not an octal number", s);
        }
        match u32::from_str_radix(s, 8) {
            Ok(bits) if bits <= Self::MAX => Ok(FileMode(bits)),
            _ => bail!("'{}' is out of range (maximum is {:04o})", s, Self::MAX),
        }
    }
}

impl fmt::Display for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04o}", self.0)
    }
}

/// Writes the rendered template to `path` and applies `mode` to it.
///
/// The file is created or truncated in place.  The permissions are set again
/// after writing because the creation mode is filtered by the umask and has
/// no effect on files that already exist.
pub fn write_output(path: &Path, contents: &str, mode: FileMode) -> Result<(), Error> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(mode.bits());
    }

    let mut file = options
        .open(path)
        .with_context(|| format!("couldn't write output file {}", path.display()))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.flush())
        .with_context(|| format!("couldn't write output file {}", path.display()))?;
    drop(file);

    set_mode(path, mode).with_context(|| format!("couldn't chmod output file {}", path.display()))
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: FileMode) -> Result<(), Error> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode.bits()))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(path: &Path, mode: FileMode) -> Result<(), Error> {
    // only the metadata lookup can fail here
    fs::metadata(path)?;
    tracing::warn!(
        "file modes are not supported on this platform, ignoring mode {} for {}",
        mode,
        path.display()
    );
    Ok(())
}
