#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Os {
    Linux,
    MacOs,
    Windows,
    Unknown(String),
}

impl Os {
    pub fn as_str(&self) -> &str {
        match self {
            Os::Linux => "linux",
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::Unknown(value) => value.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arch {
    X86_64,
    Aarch64,
    Unknown(String),
}

impl Arch {
    pub fn as_str(&self) -> &str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Unknown(value) => value.as_str(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: Os,
    pub arch: Arch,
}

impl Platform {
    pub fn current() -> Self {
        let os = match std::env::consts::OS {
            "linux" => Os::Linux,
            "macos" => Os::MacOs,
            "windows" => Os::Windows,
            other => Os::Unknown(other.to_string()),
        };

        let arch = match std::env::consts::ARCH {
            "x86_64" => Arch::X86_64,
            "aarch64" => Arch::Aarch64,
            other => Arch::Unknown(other.to_string()),
        };

        Self { os, arch }
    }

    fn asset_patterns(&self) -> Vec<&'static str> {
        match (&self.os, &self.arch) {
            (Os::Linux, Arch::X86_64) => vec![
                "linux-x64",
                "linux-amd64",
                "linux_amd64",
                "x86_64-linux",
                "x86_64-unknown-linux-gnu",
            ],
            (Os::Linux, Arch::Aarch64) => vec![
                "linux-arm64",
                "linux_arm64",
                "linux-aarch64",
                "aarch64-linux",
                "aarch64-unknown-linux-gnu",
            ],
            (Os::MacOs, Arch::X86_64) => vec![
                "*darwin*amd64*",
                "*darwin*x64*",
                "*macos*x64*",
                "*x86_64*apple*darwin*",
            ],
            (Os::MacOs, Arch::Aarch64) => vec![
                "*darwin*arm64*",
                "*macos*arm64*",
                "*aarch64*apple*darwin*",
            ],
            (Os::Windows, Arch::X86_64) => {
                vec!["*windows*amd64*", "*win64*", "*x86_64*windows*", "*.exe"]
            }
            (Os::Windows, Arch::Aarch64) => vec!["*windows*arm64*"],
            _ => Vec::new(),
        }
    }

    pub fn matches_asset(&self, asset_name: &str) -> bool {
        let asset_name = asset_name.to_lowercase();
        self.asset_patterns().iter().any(|pattern| {
            let pattern = pattern.to_lowercase();
            if pattern.contains('*') {
                glob::Pattern::new(&pattern)
                    .map(|glob| glob.matches(&asset_name))
                    .unwrap_or(false)
            } else {
                asset_name.contains(&pattern)
            }
        })
    }
}
