use serde::{Deserialize, Serialize};

use crate::{relay::filter::CiLabel, webhooks::gitee::PullRequestEvent};

const CI_SUCCESSFUL_DETAIL: &str = "The CI is successful.";
const CI_FAILED_DETAIL: &str = "The CI is failed.";

/// The `ci checked` message consumed by the software package service.
///
/// Fields are serialized in declaration order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiCheckedMessage {
    pub pkg_id: String,
    pub detail: String,
    pub number: u64,
    pub success: bool,
}

/// Builds the message for a filtered event. A non-empty `report` replaces the canned detail.
pub fn build_ci_checked(event: &PullRequestEvent, label: CiLabel, report: &str) -> CiCheckedMessage {
    let (success, canned) = match label {
        CiLabel::Successful => (true, CI_SUCCESSFUL_DETAIL),
        CiLabel::Failed => (false, CI_FAILED_DETAIL),
    };

    let detail = if report.is_empty() { canned } else { report };

    CiCheckedMessage {
        pkg_id: event.pkg_id().to_owned(),
        detail: detail.to_owned(),
        number: event.number(),
        success,
    }
}
