//! Webhook event routing. Each handler turns a typed payload into a
//! [`MessageChain`]; only [`WebhookReporter`] talks to the chat room.

use std::sync::Arc;

use anyhow::{Context, Result};
use perch_chat::{ChatRoom, MessageId};
use perch_store::BotStore;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::api::{GithubApi, RepoRef};
use crate::autolabel::autolabel_pull_request;
use crate::chain::{post_chain, MessageChain, ReplyTarget};
use crate::formatters::{
    escape_markdown, issue_link, ref_link, repository_link, short_ref, user_link,
};
use crate::payloads::{
    Account, ForkEvent, IssuesEvent, PullRequestEvent, PullRequestReviewEvent, PushEvent,
    RefEvent, ReleaseEvent, RepositoryEvent,
};

/// Commit replies posted under a push summary before the rest are elided.
const MAX_COMMIT_REPLIES: usize = 5;

/// Routes webhook deliveries to handlers and posts the resulting chains.
pub struct WebhookReporter {
    room: Arc<dyn ChatRoom>,
    store: Arc<dyn BotStore>,
    github: Arc<dyn GithubApi>,
}

impl WebhookReporter {
    pub fn new(
        room: Arc<dyn ChatRoom>,
        store: Arc<dyn BotStore>,
        github: Arc<dyn GithubApi>,
    ) -> Self {
        Self {
            room,
            store,
            github,
        }
    }

    /// Handles one delivery. Unknown event/action pairs post nothing.
    pub async fn handle_event(&self, event: &str, payload: &Value) -> Result<Vec<MessageId>> {
        let chain = self.route(event, payload).await?;
        if chain.is_empty() {
            tracing::debug!(event, "webhook event produced no messages");
            return Ok(Vec::new());
        }
        post_chain(self.room.as_ref(), &chain)
            .await
            .with_context(|| format!("failed to post messages for {event} event"))
    }

    async fn route(&self, event: &str, payload: &Value) -> Result<MessageChain> {
        let chain = match event {
            "push" => on_push(&parse_payload(event, payload)?),
            "issues" => on_issues(&parse_payload(event, payload)?),
            "pull_request" => {
                let pull_request: PullRequestEvent = parse_payload(event, payload)?;
                if pull_request.action == "opened" {
                    let repo = RepoRef::from_repository(&pull_request.repository);
                    if let Err(error) = autolabel_pull_request(
                        self.github.as_ref(),
                        self.store.as_ref(),
                        &repo,
                        &pull_request.pull_request,
                    )
                    .await
                    {
                        tracing::warn!(
                            repo = %repo,
                            pull_request = pull_request.pull_request.number,
                            error = ?error,
                            "failed to autolabel pull request"
                        );
                    }
                }
                on_pull_request(&pull_request)
            }
            "pull_request_review" => on_pull_request_review(&parse_payload(event, payload)?),
            "create" => on_create(&parse_payload(event, payload)?),
            "delete" => on_delete(&parse_payload(event, payload)?),
            "release" => on_release(&parse_payload(event, payload)?),
            "fork" => on_fork(&parse_payload(event, payload)?),
            "repository" => on_repository(&parse_payload(event, payload)?),
            _ => MessageChain::new(),
        };
        tracing::debug!(event, steps = chain.steps().len(), "routed webhook event");
        Ok(chain)
    }
}

fn parse_payload<T: DeserializeOwned>(event: &str, payload: &Value) -> Result<T> {
    T::deserialize(payload).with_context(|| format!("malformed {event} payload"))
}

fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("1 {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

pub fn on_push(event: &PushEvent) -> MessageChain {
    let Some(first) = event.commits.first() else {
        return MessageChain::new();
    };
    let verb = if event.forced { "force-pushed" } else { "pushed" };
    let branch = ref_link(short_ref(&event.reference), &event.repository);
    let user = user_link(&event.sender);
    if event.commits.len() == 1 {
        return MessageChain::single(format!(
            "{user} {verb} a commit to {branch}: [{}]({})",
            escape_markdown(first.summary()),
            first.url
        ));
    }

    let mut chain = MessageChain::single(format!(
        "{user} {verb} {} to {branch}",
        plural(event.commits.len(), "commit")
    ));
    for commit in event.commits.iter().take(MAX_COMMIT_REPLIES) {
        chain.push(
            format!(
                "[`{}`]({}) {} ({})",
                commit.short_id(),
                commit.url,
                escape_markdown(commit.summary()),
                escape_markdown(&commit.author.name)
            ),
            ReplyTarget::First,
        );
    }
    if event.commits.len() > MAX_COMMIT_REPLIES {
        chain.push(
            format!(
                "...and {} more",
                plural(event.commits.len() - MAX_COMMIT_REPLIES, "commit")
            ),
            ReplyTarget::First,
        );
    }
    chain
}

/// Assignment message plus, when the sender assigned themselves, a reply
/// pointing that out.
fn assignment(
    sender: &Account,
    assignee: Option<&Account>,
    action: &str,
    subject: &str,
) -> MessageChain {
    let Some(assignee) = assignee else {
        return MessageChain::new();
    };
    let text = if action == "assigned" {
        format!(
            "{} assigned {} to {subject}",
            user_link(sender),
            user_link(assignee)
        )
    } else {
        format!(
            "{} unassigned {} from {subject}",
            user_link(sender),
            user_link(assignee)
        )
    };
    let chain = MessageChain::single(text);
    if action == "assigned" && assignee.login == sender.login {
        return chain.then(
            format!(
                "{} assigned themselves. Self-assignment should be agreed on with the team first.",
                escape_markdown(&assignee.login)
            ),
            ReplyTarget::Previous,
        );
    }
    chain
}

pub fn on_issues(event: &IssuesEvent) -> MessageChain {
    let issue = issue_link(event.issue.number, &event.issue.html_url, &event.issue.title);
    let repository = repository_link(&event.repository, false);
    let user = user_link(&event.sender);
    match event.action.as_str() {
        "opened" => MessageChain::single(format!("{user} opened issue {issue} in {repository}")),
        "reopened" => {
            MessageChain::single(format!("{user} reopened issue {issue} in {repository}"))
        }
        "closed" => {
            let reason = match event.issue.state_reason.as_deref() {
                Some("not_planned") => " as not planned",
                _ => "",
            };
            MessageChain::single(format!(
                "{user} closed issue {issue}{reason} in {repository}"
            ))
        }
        action @ ("assigned" | "unassigned") => assignment(
            &event.sender,
            event.assignee.as_ref(),
            action,
            &format!("issue {issue} in {repository}"),
        ),
        _ => MessageChain::new(),
    }
}

pub fn on_pull_request(event: &PullRequestEvent) -> MessageChain {
    let pull = &event.pull_request;
    let link = issue_link(pull.number, &pull.html_url, &pull.title);
    let repository = repository_link(&event.repository, false);
    let user = user_link(&event.sender);
    match event.action.as_str() {
        "opened" => MessageChain::single(format!(
            "{user} opened pull request {link} ({} → {}) in {repository}",
            escape_markdown(&pull.head.reference),
            escape_markdown(&pull.base.reference)
        )),
        "reopened" => MessageChain::single(format!(
            "{user} reopened pull request {link} in {repository}"
        )),
        "closed" if pull.merged => MessageChain::single(format!(
            "{user} merged pull request {link} in {repository}"
        )),
        "closed" => MessageChain::single(format!(
            "{user} closed pull request {link} in {repository}"
        )),
        "ready_for_review" => MessageChain::single(format!(
            "{user} marked pull request {link} in {repository} as ready for review"
        )),
        action @ ("assigned" | "unassigned") => assignment(
            &event.sender,
            event.assignee.as_ref(),
            action,
            &format!("pull request {link} in {repository}"),
        ),
        _ => MessageChain::new(),
    }
}

pub fn on_pull_request_review(event: &PullRequestReviewEvent) -> MessageChain {
    if event.action != "submitted" {
        return MessageChain::new();
    }
    let verb = match event.review.state.to_ascii_lowercase().as_str() {
        "approved" => "approved",
        "changes_requested" => "requested changes on",
        _ => "reviewed",
    };
    let pull = &event.pull_request;
    MessageChain::single(format!(
        "{} [{verb}]({}) pull request {} in {}",
        user_link(&event.sender),
        event.review.html_url,
        issue_link(pull.number, &pull.html_url, &pull.title),
        repository_link(&event.repository, false)
    ))
}

pub fn on_create(event: &RefEvent) -> MessageChain {
    MessageChain::single(format!(
        "{} created {} {} in {}",
        user_link(&event.sender),
        event.ref_type,
        ref_link(&event.reference, &event.repository),
        repository_link(&event.repository, false)
    ))
}

pub fn on_delete(event: &RefEvent) -> MessageChain {
    MessageChain::single(format!(
        "{} deleted {} {} in {}",
        user_link(&event.sender),
        event.ref_type,
        escape_markdown(&event.reference),
        repository_link(&event.repository, false)
    ))
}

pub fn on_release(event: &ReleaseEvent) -> MessageChain {
    if event.action != "released" {
        return MessageChain::new();
    }
    let name = event
        .release
        .name
        .as_deref()
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(&event.release.tag_name);
    MessageChain::single(format!(
        "{} released [{}]({}) in {}",
        user_link(&event.sender),
        escape_markdown(name),
        event.release.html_url,
        repository_link(&event.repository, false)
    ))
}

pub fn on_fork(event: &ForkEvent) -> MessageChain {
    MessageChain::single(format!(
        "{} forked {} into {}",
        user_link(&event.sender),
        repository_link(&event.repository, true),
        repository_link(&event.forkee, true)
    ))
}

pub fn on_repository(event: &RepositoryEvent) -> MessageChain {
    let verb = match event.action.as_str() {
        "created" => "created",
        "deleted" => "deleted",
        "archived" => "archived",
        "unarchived" => "unarchived",
        "renamed" => "renamed",
        "publicized" => "made public",
        _ => return MessageChain::new(),
    };
    MessageChain::single(format!(
        "{} {verb} repository {}",
        user_link(&event.sender),
        repository_link(&event.repository, true)
    ))
}
