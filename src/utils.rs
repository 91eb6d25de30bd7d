//! Utility functions for file operations and path manipulation

use crate::error::{Error, Result};
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tokio::io::AsyncWriteExt;

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// Maximum length of a sanitized file stem, in characters
const MAX_STEM_CHARS: usize = 200;

/// Characters that are invalid in file names on at least one supported platform
const INVALID_FILENAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Name of the scratch file used to probe write access
const WRITE_PROBE_NAME: &str = ".ydl_write_test";

/// Make a title safe to use as a file stem
///
/// Invalid characters become `_`, leading and trailing dots and spaces are removed,
/// the result is capped at 200 characters, and an empty result becomes `"download"`.
///
/// # Examples
///
/// ```
/// use ydl_core::utils::sanitize_filename;
///
/// assert_eq!(sanitize_filename("AC/DC: Live?"), "AC_DC_ Live_");
/// assert_eq!(sanitize_filename(" ..hidden.. "), "hidden");
/// assert_eq!(sanitize_filename("..."), "download");
/// ```
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| {
            if INVALID_FILENAME_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    let trimmed: String = replaced
        .trim_matches(|c| c == '.' || c == ' ')
        .chars()
        .take(MAX_STEM_CHARS)
        .collect();

    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed
    }
}

/// Get a collision-free path for `<dir>/<stem>.<ext>`
///
/// The stem is used as given; callers sanitize it first. If the file exists, " (1)",
/// " (2)", ... is appended to the stem until a free name is found. After 9999
/// collisions a random suffix is used instead.
///
/// # Examples
///
/// ```no_run
/// use ydl_core::utils::get_unique_path;
/// use std::path::Path;
///
/// let unique = get_unique_path(Path::new("/tmp"), "clip", "mp4").unwrap();
/// // If /tmp/clip.mp4 exists, returns /tmp/clip (1).mp4
/// // If that exists too, returns /tmp/clip (2).mp4, etc.
/// ```
pub fn get_unique_path(dir: &Path, stem: &str, extension: &str) -> Result<PathBuf> {
    let extension = extension.trim_start_matches('.');
    let file_name = |suffix: &str| {
        if extension.is_empty() {
            format!("{stem}{suffix}")
        } else {
            format!("{stem}{suffix}.{extension}")
        }
    };

    let candidate = dir.join(file_name(""));
    if !candidate.exists() {
        return Ok(candidate);
    }

    for i in 1..=MAX_RENAME_ATTEMPTS {
        let candidate = dir.join(file_name(&format!(" ({i})")));
        if !candidate.exists() {
            return Ok(candidate);
        }
    }

    let random = uuid::Uuid::new_v4().simple().to_string();
    let candidate = dir.join(file_name(&format!("_{}", &random[..8])));
    if candidate.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free file name for {stem} in {}", dir.display()),
        )));
    }
    Ok(candidate)
}

/// Check that files can be created in `dir`
///
/// Creates the directory if it is missing, then creates and removes a scratch file.
pub fn probe_writable(dir: &Path) -> bool {
    if let Err(e) = std::fs::create_dir_all(dir) {
        tracing::debug!(dir = %dir.display(), error = %e, "Cannot create destination directory");
        return false;
    }

    let probe = dir.join(WRITE_PROBE_NAME);
    match std::fs::File::create(&probe) {
        Ok(_) => {
            if let Err(e) = std::fs::remove_file(&probe) {
                tracing::warn!(path = %probe.display(), error = %e, "Failed to remove write probe");
            }
            true
        }
        Err(e) => {
            tracing::debug!(dir = %dir.display(), error = %e, "Write probe failed");
            false
        }
    }
}

/// Name of the final output a file belongs to, without extension or engine suffixes
///
/// Strips the engine's temporary suffixes, then one media extension, then a
/// `.temp` marker or `.f<format id>` tag. Dots inside the title are preserved:
/// `Mr. Robot.f137.mp4.part` and `Mr. Robot.mp4` both yield `Mr. Robot`.
pub fn output_stem(file_name: &str) -> Option<&str> {
    let mut name = file_name;
    while let Some(rest) = strip_transfer_suffix(name) {
        name = rest;
    }

    let stem = if let Some(rest) = name.strip_suffix(".temp") {
        rest
    } else {
        let rest = strip_extension(name);
        rest.strip_suffix(".temp")
            .or_else(|| strip_format_tag(rest))
            .unwrap_or(rest)
    };

    Some(stem).filter(|s| !s.is_empty() && !s.starts_with('.'))
}

/// Whether `file_name` is one of the engine's temporary files for `stem`
///
/// The name must be `stem` followed by `.` and a temporary-file tail such as
/// `mp4.part`, `f137.mp4.part`, `mp4.ytdl`, `temp.mp4` or `temp`. Finished files
/// (`stem.mp4`) and other names that merely share the prefix never match.
pub fn is_partial_file_of(file_name: &str, stem: &str) -> bool {
    file_name
        .strip_prefix(stem)
        .and_then(|rest| rest.strip_prefix('.'))
        .is_some_and(|tail| partial_tail_regex().is_match(tail))
}

fn partial_tail_regex() -> &'static Regex {
    static TAIL: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    TAIL.get_or_init(|| {
        Regex::new(r"^(?:f\d+\.)?(?:[A-Za-z0-9]{1,5}\.)?(?:part(?:-Frag\d+(?:\.part)?)?|ytdl|temp(?:\.[A-Za-z0-9]{1,5})?)$")
            .expect("valid partial tail regex")
    })
}

fn strip_transfer_suffix(name: &str) -> Option<&str> {
    if let Some(rest) = name.strip_suffix(".part").or_else(|| name.strip_suffix(".ytdl")) {
        return Some(rest);
    }
    // "clip.mp4.part-Frag12"
    let (rest, frag) = name.rsplit_once(".part-Frag")?;
    (!frag.is_empty() && frag.bytes().all(|b| b.is_ascii_digit())).then_some(rest)
}

fn strip_extension(name: &str) -> &str {
    match name.rsplit_once('.') {
        Some((rest, ext))
            if !rest.is_empty()
                && (1..=5).contains(&ext.len())
                && ext.bytes().all(|b| b.is_ascii_alphanumeric()) =>
        {
            rest
        }
        _ => name,
    }
}

fn strip_format_tag(name: &str) -> Option<&str> {
    let (rest, tag) = name.rsplit_once(".f")?;
    (!rest.is_empty() && !tag.is_empty() && tag.bytes().all(|b| b.is_ascii_digit())).then_some(rest)
}

/// List the engine's temporary files for `stem` in `dir`
///
/// Only names accepted by [`is_partial_file_of`] are returned, so `clip.mp4.part`
/// and `clip.f137.mp4.part` are found while `clip.mp4` and `clipboard.iso.part`
/// are not.
pub fn find_partial_files(dir: &Path, stem: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if is_partial_file_of(name, stem) {
            found.push(entry.path());
        }
    }
    Ok(found)
}

/// Serialize `value` as pretty JSON and atomically replace `path` with it
///
/// The data is written to a sibling temporary file, flushed to disk, then renamed
/// over `path`. A failure at any step leaves the previous file untouched.
pub async fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let write = async {
        let mut file = tokio::fs::File::create(&tmp_path).await?;
        file.write_all(&json).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp_path, path).await
    };

    if let Err(e) = write.await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Platform downloads folder, or "./downloads" when the platform has none
pub fn default_downloads_dir() -> PathBuf {
    dirs::download_dir().unwrap_or_else(|| PathBuf::from("downloads"))
}

/// Directory holding the history and settings files
pub fn app_data_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("ydownloader"))
        .unwrap_or_else(|| PathBuf::from(".ydownloader"))
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs:
/// - Unix: `statvfs`
/// - Windows: `GetDiskFreeSpaceExW`
///
/// Returns the bytes available to an unprivileged user, or an IO error if the
/// check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid, null-terminated C string, stat is zeroed before
        // the call and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail counts blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is a valid, null-terminated wide string and every output
        // pointer refers to a live, aligned u64 that is only read after success.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut total_bytes: u64 = 0;
            let mut total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut total_bytes as *mut u64 as *mut _,
                &mut total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        let _ = path;
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
