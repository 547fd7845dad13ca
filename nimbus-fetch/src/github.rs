use crate::error::FetchError;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct GitHubRelease {
    pub tag_name: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub prerelease: bool,
    #[serde(default)]
    pub draft: bool,
    #[serde(default)]
    pub assets: Vec<Asset>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
    #[serde(default)]
    pub size: u64,
}

/// Thin client over the public GitHub releases API, used to resolve the
/// latest non-draft, non-prerelease build of a tool and fetch one of its
/// assets.
pub struct GitHubSource {
    owner_repo: String,
    api_base: String,
}

impl GitHubSource {
    pub fn new(owner_repo: impl Into<String>) -> Self {
        Self {
            owner_repo: owner_repo.into(),
            api_base: "https://api.github.com".to_string(),
        }
    }

    #[cfg(test)]
    pub fn with_api_base(owner_repo: impl Into<String>, api_base: impl Into<String>) -> Self {
        Self {
            owner_repo: owner_repo.into(),
            api_base: api_base.into(),
        }
    }

    pub fn latest_release(&self) -> Result<GitHubRelease, FetchError> {
        let url = format!("{}/repos/{}/releases/latest", self.api_base, self.owner_repo);
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent("nimbus-fetch")
            .build()?;
        let response = client.get(&url).send()?.error_for_status()?;
        Ok(response.json()?)
    }

    pub fn download_asset(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(120))
            .user_agent("nimbus-fetch")
            .build()?;
        let response = client.get(url).send()?.error_for_status()?;
        Ok(response.bytes()?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_release_payload() {
        let json = r#"
        {
            "tag_name": "v5.7.4",
            "name": "v5.7.4",
            "prerelease": false,
            "draft": false,
            "assets": [
                {
                    "name": "k3d-linux-amd64",
                    "browser_download_url": "https://example.com/k3d-linux-amd64",
                    "size": 1234
                }
            ]
        }
        "#;
        let release: GitHubRelease = serde_json::from_str(json).expect("deserialize");
        assert_eq!(release.tag_name, "v5.7.4");
        assert!(!release.prerelease);
        assert_eq!(release.assets.len(), 1);
        assert_eq!(release.assets[0].name, "k3d-linux-amd64");
    }

    #[test]
    fn latest_release_resolves_against_mock_server() {
        let mut server = mockito::Server::new();
        let body = r#"{"tag_name":"v1.0.0","assets":[{"name":"tool-linux-amd64","browser_download_url":"https://example.com/tool","size":10}]}"#;
        let mock = server
            .mock("GET", "/repos/k3d-io/k3d/releases/latest")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create();

        let source = GitHubSource::with_api_base("k3d-io/k3d", server.url());
        let release = source.latest_release().expect("latest_release");
        assert_eq!(release.tag_name, "v1.0.0");
        mock.assert();
    }
}
