//! Filesystem and path helpers

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Create a directory (and parents) if it does not exist
///
/// Failures are reported as [`Error::Disk`] naming the directory, since they
/// usually mean a permissions problem the user has to fix.
pub async fn ensure_dir(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| Error::disk(path, e))
}

/// Make a string safe to use as a single path component
///
/// Release tags are used as cache subdirectory names; anything other than
/// alphanumerics, `.`, `-` and `_` becomes `_`, and the special names `.`/`..`
/// are neutralized.
pub fn sanitize_component(raw: &str) -> String {
    let cleaned: String = raw
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    match cleaned.as_str() {
        "" | "." | ".." => "_".repeat(cleaned.len().max(1)),
        _ => cleaned,
    }
}

/// Refuse an operation that would leave less than `min_free_space` bytes free
///
/// `path` need not exist yet; the check runs against the volume of its nearest
/// existing ancestor.
pub fn check_disk_space(path: &Path, required: u64, config: &DiskSpaceConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }

    let volume = existing_ancestor(path);
    let available = get_available_space(&volume)
        .map_err(|e| Error::DiskSpaceCheckFailed(format!("{}: {}", path.display(), e)))?;
    let needed = required.saturating_add(config.min_free_space);

    if available < needed {
        tracing::warn!(
            path = %path.display(),
            required = needed,
            available,
            "not enough free space"
        );
        return Err(Error::InsufficientSpace {
            required: needed,
            available,
        });
    }

    Ok(())
}

/// Get available disk space for a given path
///
/// Uses `statvfs` on Unix and `GetDiskFreeSpaceExW` on Windows.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized
        // and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail counts blocks available to unprivileged users
            #[allow(clippy::unnecessary_cast)]
            let available = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available)
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

        // SAFETY: wide_path is NUL-terminated and every out-pointer refers to a live
        // u64; the values are only read after the call reports success.
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
            "disk space checking is not supported on this platform",
        ))
    }
}

/// Keep child processes from opening a console window on Windows
pub(crate) fn hide_console_window(command: &mut tokio::process::Command) {
    #[cfg(windows)]
    {
        const CREATE_NO_WINDOW: u32 = 0x0800_0000;
        command.creation_flags(CREATE_NO_WINDOW);
    }

    #[cfg(not(windows))]
    let _ = command;
}

/// Nearest existing ancestor of `path` (itself included)
///
/// Used to check free space for directories that are about to be created.
pub(crate) fn existing_ancestor(path: &Path) -> PathBuf {
    path.ancestors()
        .find(|p| !p.as_os_str().is_empty() && p.exists())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}
