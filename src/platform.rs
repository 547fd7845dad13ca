//! Host profile discovery and path translation (spec component C2).
//!
//! [`HostProfile`] is computed once per process and shared via `Arc`; all
//! platform-dependent decisions elsewhere in the crate (which package
//! manager to try, whether to translate a path for a Linux compatibility
//! layer, which shell runs an inline script) go through it rather than
//! re-deriving environment facts ad hoc.

use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFamily {
    Linux,
    MacOs,
    Windows,
    /// A WSL-style Linux compatibility layer running under Windows.
    WindowsLinuxLayer,
    Other,
}

#[derive(Debug, Clone)]
pub struct HostProfile {
    pub family: HostFamily,
    /// Package managers available on this host, in try-order.
    pub package_managers: Vec<&'static str>,
    /// The shell used to run an inline "run shell" script.
    pub shell: &'static str,
}

impl HostProfile {
    /// Detects the current host profile. Detection failures degrade to
    /// [`HostFamily::Other`] rather than propagating an error — platform
    /// detection must never itself prevent startup.
    pub fn detect() -> Self {
        if let Ok(forced) = std::env::var("NIMBUS_FORCE_HOST") {
            return Self::for_family(parse_forced_family(&forced));
        }

        let family = if cfg!(target_os = "windows") {
            HostFamily::Windows
        } else if cfg!(target_os = "macos") {
            HostFamily::MacOs
        } else if cfg!(target_os = "linux") {
            if is_windows_linux_layer() {
                HostFamily::WindowsLinuxLayer
            } else {
                HostFamily::Linux
            }
        } else {
            HostFamily::Other
        };

        Self::for_family(family)
    }

    fn for_family(family: HostFamily) -> Self {
        let package_managers = match family {
            HostFamily::Linux | HostFamily::WindowsLinuxLayer => {
                vec!["apt-get", "dnf", "pacman"]
            }
            HostFamily::MacOs => vec!["brew"],
            HostFamily::Windows | HostFamily::Other => vec![],
        };
        let shell = match family {
            HostFamily::Windows => "powershell",
            _ => "sh",
        };
        Self {
            family,
            package_managers,
            shell,
        }
    }

    pub fn is_linux_like(&self) -> bool {
        matches!(self.family, HostFamily::Linux | HostFamily::WindowsLinuxLayer)
    }

    /// Translates a Windows-style path (`C:\Users\me`) into the equivalent
    /// path inside a Linux compatibility layer (`/mnt/c/Users/me`), and back.
    /// A no-op outside [`HostFamily::WindowsLinuxLayer`].
    pub fn translate_path(&self, path: &str) -> String {
        if self.family != HostFamily::WindowsLinuxLayer {
            return path.to_string();
        }
        if let Some(drive) = windows_drive_letter(path) {
            let rest = &path[2..].replace('\\', "/");
            let rest = rest.strip_prefix('/').unwrap_or(rest);
            format!("/mnt/{}/{}", drive.to_ascii_lowercase(), rest)
        } else if let Some(mnt_path) = path.strip_prefix("/mnt/") {
            let mut parts = mnt_path.splitn(2, '/');
            let drive = parts.next().unwrap_or_default();
            let rest = parts.next().unwrap_or_default();
            if drive.len() == 1 {
                format!("{}:\\{}", drive.to_ascii_uppercase(), rest.replace('/', "\\"))
            } else {
                path.to_string()
            }
        } else {
            path.to_string()
        }
    }
}

fn windows_drive_letter(path: &str) -> Option<char> {
    let mut chars = path.chars();
    let first = chars.next()?;
    if first.is_ascii_alphabetic() && chars.next() == Some(':') {
        Some(first)
    } else {
        None
    }
}

fn parse_forced_family(value: &str) -> HostFamily {
    match value {
        "linux" => HostFamily::Linux,
        "macos" => HostFamily::MacOs,
        "windows" => HostFamily::Windows,
        "windows-linux-layer" => HostFamily::WindowsLinuxLayer,
        _ => HostFamily::Other,
    }
}

/// Detects a WSL-style Linux layer by looking for the `microsoft` marker
/// that WSL kernels embed in `/proc/version`, mirroring the way this
/// codebase already distinguishes a toolbox/container runtime environment
/// by checking for its own marker files.
fn is_windows_linux_layer() -> bool {
    proc_version_contains_marker(Path::new("/proc/version"))
}

fn proc_version_contains_marker(path: &Path) -> bool {
    std::fs::read_to_string(path)
        .map(|contents| {
            let lower = contents.to_lowercase();
            lower.contains("microsoft") || lower.contains("wsl")
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn forced_family_overrides_detection() {
        std::env::set_var("NIMBUS_FORCE_HOST", "windows-linux-layer");
        let profile = HostProfile::detect();
        std::env::remove_var("NIMBUS_FORCE_HOST");
        assert_eq!(profile.family, HostFamily::WindowsLinuxLayer);
        assert!(profile.is_linux_like());
    }

    #[test]
    fn translates_windows_path_to_layer_path() {
        let profile = HostProfile::for_family(HostFamily::WindowsLinuxLayer);
        assert_eq!(
            profile.translate_path(r"C:\Users\me\project"),
            "/mnt/c/Users/me/project"
        );
    }

    #[test]
    fn translates_layer_path_back_to_windows_path() {
        let profile = HostProfile::for_family(HostFamily::WindowsLinuxLayer);
        assert_eq!(
            profile.translate_path("/mnt/c/Users/me/project"),
            r"C:\Users\me\project"
        );
    }

    #[test]
    fn translation_is_noop_outside_layer() {
        let profile = HostProfile::for_family(HostFamily::Linux);
        assert_eq!(profile.translate_path(r"C:\Users\me"), r"C:\Users\me");
    }

    #[test]
    fn proc_version_marker_detects_wsl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Linux version 5.15.90.1-microsoft-standard-WSL2").unwrap();
        assert!(proc_version_contains_marker(file.path()));
    }

    #[test]
    fn proc_version_without_marker_is_plain_linux() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "Linux version 6.5.0-generic").unwrap();
        assert!(!proc_version_contains_marker(file.path()));
    }
}
