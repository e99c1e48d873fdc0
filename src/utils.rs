//! Utility functions for disk space, URL decoding and environment details

use crate::error::{Error, Result};
use std::path::Path;

/// Decode a candidate URL taken from an item manifest
///
/// Manifests carry HTML-escaped, percent-encoded URLs. This is the single canonical decode:
/// `&#32;` becomes `%20`, `&amp;` becomes `&`, then one percent-decoding pass. Byte sequences
/// that are not valid UTF-8 after decoding are replaced rather than rejected.
///
/// # Examples
///
/// ```
/// use ftp_harvest::utils::decode_candidate_url;
///
/// assert_eq!(
///     decode_candidate_url("ftp://h/a&#32;b&amp;c%2Etxt"),
///     "ftp://h/a b&c.txt"
/// );
/// ```
pub fn decode_candidate_url(raw: &str) -> String {
    let unescaped = raw.replace("&#32;", "%20").replace("&amp;", "&");
    let bytes = urlencoding::decode_binary(unescaped.as_bytes());
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Whether a URL names a directory (its path ends with `/`)
pub fn is_directory_url(url: &url::Url) -> bool {
    url.path().ends_with('/')
}

/// Operating system and architecture of this process, e.g. `linux-x86_64`
pub fn environment_fingerprint() -> String {
    format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH)
}

/// Fail unless `path` has at least `required` bytes free
///
/// # Errors
///
/// [`Error::InsufficientSpace`] when there is not enough room, [`Error::DiskSpaceCheckFailed`]
/// when the filesystem cannot be queried.
pub fn ensure_space(path: &Path, required: u64) -> Result<()> {
    let available = get_available_space(path)
        .map_err(|e| Error::DiskSpaceCheckFailed(format!("{}: {e}", path.display())))?;
    if available < required {
        return Err(Error::InsufficientSpace {
            required,
            available,
        });
    }
    Ok(())
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux: statvfs
/// - macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
///
/// # Arguments
///
/// * `path` - The path to check (typically the data directory)
///
/// # Returns
///
/// Returns the available disk space in bytes, or an IO error if the check fails.
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid NUL-terminated string, stat is zero-initialized and only
        // read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            // f_bavail is available blocks for unprivileged users
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

        // SAFETY: wide_path is NUL-terminated and every output pointer refers to a live,
        // aligned u64 that is only read after the call succeeds.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "disk space checking is not supported on this platform",
        ))
    }
}
