use std::sync::Arc;

use perch_github::formatters::issue_link;
use perch_github::{CloseReason, NewIssue, RepoRef};

use crate::{current_user, BotServices, CommandError, OperationResult, Reply};

use super::Arguments;

fn issue_number(raw: i64) -> Result<u64, CommandError> {
    u64::try_from(raw)
        .ok()
        .filter(|number| *number > 0)
        .ok_or_else(|| CommandError::message(format!("{raw} is not an issue number.")))
}

pub(super) async fn open(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let caller = current_user(&arguments)?;
    let repo = RepoRef::new(&services.github_owner, arguments.string("repository")?);
    let attribution = format!("_Opened from chat by {}._", caller.name);
    let body = match arguments.optional_string("body")? {
        Some(text) => format!("{text}\n\n{attribution}"),
        None => attribution,
    };
    let issue = NewIssue {
        title: arguments.string("title")?.to_string(),
        body: Some(body),
        labels: arguments
            .optional_string_array("labels")?
            .map(<[String]>::to_vec)
            .unwrap_or_default(),
    };

    let created = services
        .github
        .create_issue(&repo, &issue)
        .await
        .map_err(CommandError::Github)?;
    tracing::info!(repository = %repo, number = created.number, "opened issue from chat");
    Ok(Some(Reply::Here(format!(
        "Opened {}",
        issue_link(created.number, &created.html_url, &created.title)
    ))))
}

pub(super) async fn close(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let repo = RepoRef::new(&services.github_owner, arguments.string("repository")?);
    let number = issue_number(arguments.int("number")?)?;
    let reason_name = arguments.flag("reason")?;
    let reason = CloseReason::parse(reason_name)
        .ok_or_else(|| CommandError::message(format!("Unknown close reason {reason_name}.")))?;

    let closed = services
        .github
        .close_issue(&repo, number, reason)
        .await
        .map_err(CommandError::Github)?;
    Ok(Some(Reply::Here(format!(
        "Closed {} as {}.",
        issue_link(closed.number, &closed.html_url, &closed.title),
        reason_name.replace('_', " ")
    ))))
}
