//! Local checks run before a worker is spawned

use std::path::Path;

use crate::config::DiskSpaceConfig;
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;

/// Verify the destination is writable and has enough free space
pub(crate) fn check_destination(
    filesystem: &dyn Filesystem,
    disk_space: &DiskSpaceConfig,
    dir: &Path,
) -> Result<()> {
    if !filesystem.can_write(dir) {
        return Err(Error::PermissionDenied {
            path: dir.to_path_buf(),
        });
    }

    if !disk_space.enabled {
        return Ok(());
    }

    let available = filesystem
        .available_bytes(dir)
        .map_err(|e| Error::DiskSpaceCheckFailed(format!("{}: {e}", dir.display())))?;

    if available < disk_space.min_free_space {
        return Err(Error::InsufficientSpace {
            required: disk_space.min_free_space,
            available,
        });
    }

    tracing::debug!(dir = %dir.display(), available_bytes = available, "Preflight passed");
    Ok(())
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::test_helpers::StubFilesystem;

    fn disk(min_free_space: u64) -> DiskSpaceConfig {
        DiskSpaceConfig {
            enabled: true,
            min_free_space,
        }
    }

    #[test]
    fn unwritable_directory_is_rejected_first() {
        let fs = StubFilesystem::new().read_only().with_available(0);
        match check_destination(&fs, &disk(1), Path::new("/locked")) {
            Err(Error::PermissionDenied { path }) => assert_eq!(path, Path::new("/locked")),
            other => panic!("expected PermissionDenied, got {other:?}"),
        }
    }

    #[test]
    fn low_space_is_rejected() {
        let fs = StubFilesystem::new().with_available(100);
        match check_destination(&fs, &disk(1_000), Path::new("/full")) {
            Err(Error::InsufficientSpace {
                required,
                available,
            }) => {
                assert_eq!(required, 1_000);
                assert_eq!(available, 100);
            }
            other => panic!("expected InsufficientSpace, got {other:?}"),
        }
    }

    #[test]
    fn failed_space_query_is_reported() {
        let fs = StubFilesystem::new().with_space_error();
        assert!(matches!(
            check_destination(&fs, &disk(1), Path::new("/dev/null/x")),
            Err(Error::DiskSpaceCheckFailed(_))
        ));
    }

    #[test]
    fn disabled_space_check_skips_query() {
        let fs = StubFilesystem::new().with_space_error();
        let config = DiskSpaceConfig {
            enabled: false,
            min_free_space: u64::MAX,
        };
        check_destination(&fs, &config, Path::new("/anywhere")).unwrap();
    }

    #[test]
    fn enough_space_passes() {
        let fs = StubFilesystem::new().with_available(10_000);
        check_destination(&fs, &disk(1_000), Path::new("/ok")).unwrap();
    }
}
