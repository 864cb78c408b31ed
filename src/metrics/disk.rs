//! Filesystem usage via statvfs.

use anyhow::{bail, Context, Result};
use std::path::Path;

/// Block counts for a mounted filesystem
#[derive(Debug, Clone, Copy)]
pub struct FsUsage {
    pub total_bytes: u64,
    pub free_bytes: u64,
}

impl FsUsage {
    pub fn used_percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        let used = self.total_bytes.saturating_sub(self.free_bytes);
        100.0 * used as f64 / self.total_bytes as f64
    }
}

/// Usage percentage of the filesystem holding `path`
pub fn used_percent(path: &Path) -> Result<f64> {
    Ok(fs_usage(path)?.used_percent())
}

#[cfg(unix)]
fn fs_usage(path: &Path) -> Result<FsUsage> {
    use std::ffi::CString;
    use std::mem::MaybeUninit;

    let c_path = CString::new(path.to_string_lossy().as_bytes())
        .context("Filesystem path contains a NUL byte")?;
    let mut statvfs = MaybeUninit::<libc::statvfs>::uninit();

    let result = unsafe { libc::statvfs(c_path.as_ptr(), statvfs.as_mut_ptr()) };
    if result != 0 {
        bail!(
            "statvfs({}) failed: {}",
            path.display(),
            std::io::Error::last_os_error()
        );
    }

    let statvfs = unsafe { statvfs.assume_init() };
    let block_size = statvfs.f_frsize as u64;

    Ok(FsUsage {
        total_bytes: statvfs.f_blocks as u64 * block_size,
        free_bytes: statvfs.f_bfree as u64 * block_size,
    })
}

#[cfg(not(unix))]
fn fs_usage(path: &Path) -> Result<FsUsage> {
    bail!("filesystem usage is not supported on this platform ({})", path.display())
}
