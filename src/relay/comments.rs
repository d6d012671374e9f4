use async_trait::async_trait;
use tracing::{debug, error};

use crate::gitee::{CommentFetchError, PrComment};

/// Every CI report posted by the robot starts with this table header.
pub const CI_COMMENT_PREFIX: &str = "<table><tr><th>Check Name";

/// Read access to the comments of a pull request.
#[async_trait]
pub trait CommentSource: Send + Sync {
    /// Returns all comments of the pull request, oldest first.
    async fn list_pr_comments(
        &self,
        org: &str,
        repo: &str,
        number: u64,
    ) -> Result<Vec<PrComment>, CommentFetchError>;
}

pub struct CommentScanner<C> {
    source: C,
    robot: String,
}

impl<C: CommentSource> CommentScanner<C> {
    pub fn new(source: C, robot: String) -> Self {
        Self { source, robot }
    }

    /// Body of the most recent CI report on the pull request, or an empty string.
    ///
    /// A failure to list comments is logged and treated as "no report": the status message is
    /// still worth sending without the details.
    pub async fn latest_report(&self, org: &str, repo: &str, number: u64) -> String {
        let comments = match self.source.list_pr_comments(org, repo, number).await {
            Ok(comments) => comments,
            Err(e) => {
                error!("get pr comments error: {}", e);
                return String::new();
            }
        };

        match select_latest_report(&comments, &self.robot, CI_COMMENT_PREFIX) {
            Some(body) => body.to_owned(),
            None => {
                debug!("no CI report from {} on {}/{}!{}", self.robot, org, repo, number);
                String::new()
            }
        }
    }
}

/// Scans `comments` from the newest one and stops at the first body written by `robot` that
/// starts with `prefix`. Comments without an author are skipped.
pub fn select_latest_report<'c>(
    comments: &'c [PrComment],
    robot: &str,
    prefix: &str,
) -> Option<&'c str> {
    comments
        .iter()
        .rev()
        .find(|comment| {
            comment.user.as_ref().is_some_and(|user| user.login == robot)
                && comment.body.starts_with(prefix)
        })
        .map(|comment| comment.body.as_str())
}
