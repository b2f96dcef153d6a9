use serde::Deserialize;

use crate::error::ReviewError;
use crate::models::Credential;

const DIVIDER_WIDTH: usize = 80;

#[derive(Debug, Deserialize)]
struct PullRequest {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangedFile {
    pub filename: Option<String>,
    pub status: Option<String>,
    pub patch: Option<String>,
}

/// Splits `https://github.com/{owner}/{repo}` into `(owner, repo)` by position:
/// segments 3 and 4 once trailing slashes are dropped.
pub fn parse_repo_url(repo_url: &str) -> Result<(&str, &str), ReviewError> {
    let segments: Vec<&str> = repo_url.trim_end_matches('/').split('/').collect();
    if segments.len() < 5 {
        return Err(ReviewError::Validation(format!(
            "invalid repository URL format: {}",
            repo_url
        )));
    }
    Ok((segments[3], segments[4]))
}

pub fn format_changes(files: &[ChangedFile]) -> String {
    let divider = "-".repeat(DIVIDER_WIDTH);
    files
        .iter()
        .map(|file| {
            format!(
                "File: {}\nStatus: {}\nPatch:\n{}\n{}",
                file.filename.as_deref().unwrap_or("Unknown file"),
                file.status.as_deref().unwrap_or("Unknown status"),
                file.patch.as_deref().unwrap_or("No patch available"),
                divider
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Fetches a pull request's changed files and flattens them into one diff.
#[derive(Clone)]
pub struct DiffFetcher {
    client: reqwest::Client,
    api_base: String,
}

impl DiffFetcher {
    pub fn new(api_base: impl Into<String>) -> Result<Self, ReviewError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("reviewbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ReviewError::upstream(None, e.to_string()))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
        })
    }

    pub async fn fetch(
        &self,
        repo_url: &str,
        pr_number: u64,
        credential: &Credential,
    ) -> Result<String, ReviewError> {
        if credential.is_empty() {
            return Err(ReviewError::Validation(
                "GitHub token is required for authentication".into(),
            ));
        }
        if repo_url.trim().is_empty() || pr_number == 0 {
            return Err(ReviewError::Validation(
                "both repository URL and PR number are required".into(),
            ));
        }

        let (owner, repo) = parse_repo_url(repo_url)?;
        tracing::info!(owner, repo, pr_number, "fetching pull request");

        let pr_url = format!(
            "{}/repos/{}/{}/pulls/{}",
            self.api_base, owner, repo, pr_number
        );
        let pull: PullRequest = self.get_json(&pr_url, credential).await?;
        let files_base = pull
            .url
            .ok_or_else(|| ReviewError::upstream(None, "pull request response has no url"))?;

        let files: Vec<ChangedFile> = self
            .get_json(&format!("{}/files", files_base), credential)
            .await?;
        tracing::info!(owner, repo, pr_number, files = files.len(), "fetched changed files");

        Ok(format_changes(&files))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        credential: &Credential,
    ) -> Result<T, ReviewError> {
        let res = self
            .client
            .get(url)
            .header("Authorization", format!("Bearer {}", credential.expose()))
            .header("Accept", "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| ReviewError::upstream(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            tracing::warn!(url, status = status.as_u16(), "source host returned an error");
            return Err(ReviewError::upstream(Some(status.as_u16()), body));
        }

        res.json::<T>()
            .await
            .map_err(|e| ReviewError::upstream(Some(status.as_u16()), e.to_string()))
    }
}
