//! GitHub side of Perch: the REST collaborator used by `issue` operations and
//! autolabeling, and the webhook endpoint that reports repository activity to
//! the chat room as reply chains.

mod api;
mod autolabel;
mod chain;
mod events;
pub mod formatters;
pub mod payloads;
mod server;
mod transport;

pub use api::{CloseReason, GithubApi, GithubApiClient, GithubClientConfig, NewIssue, RepoRef};
pub use autolabel::{autolabel_pull_request, linked_issue_numbers, queued_labels};
pub use chain::{post_chain, ChainStep, MessageChain, ReplyTarget};
pub use events::{
    on_create, on_delete, on_fork, on_issues, on_pull_request, on_pull_request_review, on_push,
    on_release, on_repository, WebhookReporter,
};
pub use server::{build_webhook_router, run_webhook_server, WebhookServerState};
