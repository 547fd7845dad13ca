//! Resolves and downloads signed GitHub release binaries for the tools in
//! the preflight catalog. This is the binary-download fallback used when a
//! tool has no native package manager entry on the current platform.

pub mod error;
pub mod github;
pub mod platform;

pub use error::FetchError;
pub use github::{GitHubRelease, GitHubSource};
pub use platform::Platform;

use nimbus_common::archive::{self, ArchiveType};
use nimbus_common::checksum::sha256_hex;
use std::path::{Path, PathBuf};

/// Downloads `binary_name` from the `owner/repo` GitHub project, verifying a
/// published checksum when one is found among the release assets, and
/// installs the extracted executable into `install_dir`. Returns the path
/// to the installed binary.
pub fn fetch_github_release(
    owner_repo: &str,
    binary_name: &str,
    install_dir: &Path,
    platform: &Platform,
) -> Result<PathBuf, FetchError> {
    let source = GitHubSource::new(owner_repo);
    let release = source.latest_release()?;
    let asset = release
        .assets
        .iter()
        .find(|asset| platform.matches_asset(&asset.name))
        .ok_or_else(|| FetchError::NoMatchingAsset {
            owner_repo: owner_repo.to_string(),
            os: platform.os.as_str().to_string(),
            arch: platform.arch.as_str().to_string(),
        })?;

    let bytes = source.download_asset(&asset.browser_download_url)?;

    if let Some(expected) = find_checksum(&release, &asset.name, &source)? {
        let actual = sha256_hex(&bytes);
        if !actual.eq_ignore_ascii_case(&expected) {
            return Err(FetchError::ChecksumMismatch {
                expected,
                actual,
            });
        }
    }

    let path = match archive::detect_archive_type(&asset.name) {
        ArchiveType::TarGz => archive::extract_tar_gz_binary(&bytes, install_dir, binary_name)?,
        ArchiveType::Zip => archive::extract_zip_binary(&bytes, install_dir, binary_name)?,
        ArchiveType::Raw => archive::write_raw(&bytes, install_dir, binary_name)?,
    };

    archive::set_executable(&path)?;
    Ok(path)
}

/// Looks for a `checksums.txt`-style asset alongside the binary and returns
/// the expected hash for `asset_name` if one is published. Absence of a
/// checksum manifest is not an error — callers treat it as "unverified".
fn find_checksum(
    release: &GitHubRelease,
    asset_name: &str,
    source: &GitHubSource,
) -> Result<Option<String>, FetchError> {
    let manifest = release.assets.iter().find(|asset| {
        let lower = asset.name.to_lowercase();
        lower.contains("checksum") || lower.contains("sha256")
    });

    let Some(manifest) = manifest else {
        return Ok(None);
    };

    let bytes = source.download_asset(&manifest.browser_download_url)?;
    let text = String::from_utf8_lossy(&bytes);
    let checksums = nimbus_common::checksum::parse_checksum_file(&text);
    Ok(checksums.get(asset_name).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_checksum_returns_none_without_manifest_asset() {
        let release = GitHubRelease {
            tag_name: "v1.0.0".to_string(),
            name: None,
            prerelease: false,
            draft: false,
            assets: vec![github::Asset {
                name: "k3d-linux-amd64.tar.gz".to_string(),
                browser_download_url: String::new(),
                size: 0,
            }],
        };
        let source = GitHubSource::new("k3d-io/k3d");
        let result = find_checksum(&release, "k3d-linux-amd64.tar.gz", &source).unwrap();
        assert!(result.is_none());
    }
}
