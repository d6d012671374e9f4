//! Minimal Gitee REST API v5 client: only what the relay needs to read CI reports.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace};
use url::Url;

use crate::relay::CommentSource;

const PER_PAGE: usize = 100;

#[derive(Debug, Error)]
pub enum CommentFetchError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Gitee answered {status}: {body}")]
    Status { status: StatusCode, body: String },
}

/// A pull request comment, as returned by `GET /repos/{owner}/{repo}/pulls/{number}/comments`.
#[derive(Clone, Debug, Deserialize)]
pub struct PrComment {
    /// `null` for comments of deleted accounts
    #[serde(default)]
    pub user: Option<CommentAuthor>,
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CommentAuthor {
    pub login: String,
}

pub struct GiteeClient {
    http: reqwest::Client,
    api_url: Url,
    token: String,
}

impl GiteeClient {
    /// `timeout` bounds every request, from connecting to reading the whole body.
    pub fn new(api_url: Url, token: String, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_url,
            token,
        })
    }

    fn comments_url(&self, org: &str, repo: &str, number: u64) -> String {
        format!(
            "{}/repos/{}/{}/pulls/{}/comments",
            self.api_url.as_str().trim_end_matches('/'),
            org,
            repo,
            number
        )
    }

    /// Lists every comment of a pull request, oldest first.
    pub async fn list_pr_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PrComment>, CommentFetchError> {
        let url = self.comments_url(org, repo, number);
        let per_page = PER_PAGE.to_string();
        let mut comments = Vec::new();

        for page in 1.. {
            trace!("fetching page {} of {}", page, url);
            let response = self
                .http
                .get(&url)
                .query(&[
                    ("access_token", self.token.as_str()),
                    ("page", page.to_string().as_str()),
                    ("per_page", per_page.as_str()),
                    ("direction", "asc"),
                ])
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(CommentFetchError::Status { status, body });
            }

            let batch: Vec<PrComment> = response.json().await?;
            let last_page = batch.len() < PER_PAGE;
            comments.extend(batch);

            if last_page {
                break;
            }
        }

        debug!(
            "fetched {} comments for {}/{}!{}",
            comments.len(),
            org,
            repo,
            number
        );

        Ok(comments)
    }
}

#[async_trait]
impl CommentSource for GiteeClient {
    async fn list_pr_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PrComment>, CommentFetchError> {
        GiteeClient::list_pr_comments(self, org, repo, number).await
    }
}
