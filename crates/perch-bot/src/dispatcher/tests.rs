use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use perch_chat::{ChatMessage, MemoryRoom, SentMessage};
use perch_github::payloads::{Issue, Label};
use perch_github::{CloseReason, GithubApi, NewIssue, RepoRef};
use perch_store::{BotStore, InMemoryBotStore};
use tokio::sync::mpsc;

use super::Dispatcher;
use crate::operations::build_registry;
use crate::reactions::{Reaction, ReactionConfig};
use crate::{BotServices, DEFAULT_PREFIX};

const BOT_ID: u64 = 1;

#[derive(Default)]
struct RecordingGithub {
    created: Mutex<Vec<(String, NewIssue)>>,
}

#[async_trait]
impl GithubApi for RecordingGithub {
    async fn get_issue(&self, _repo: &RepoRef, number: u64) -> Result<Issue> {
        Err(anyhow!("issue {number} is not stubbed"))
    }

    async fn update_issue_labels(
        &self,
        _repo: &RepoRef,
        _number: u64,
        _labels: &[String],
    ) -> Result<Vec<Label>> {
        Err(anyhow!("label updates are not stubbed"))
    }

    async fn create_issue(&self, repo: &RepoRef, issue: &NewIssue) -> Result<Issue> {
        self.created
            .lock()
            .expect("created lock")
            .push((repo.to_string(), issue.clone()));
        Ok(Issue {
            number: 7,
            title: issue.title.clone(),
            html_url: format!("https://github.com/{repo}/issues/7"),
            body: issue.body.clone(),
            labels: Vec::new(),
            state_reason: None,
        })
    }

    async fn close_issue(&self, _repo: &RepoRef, number: u64, _reason: CloseReason) -> Result<Issue> {
        Err(anyhow!("issue {number} cannot be closed"))
    }
}

struct Harness {
    room: Arc<MemoryRoom>,
    events: mpsc::Receiver<ChatMessage>,
    store: Arc<InMemoryBotStore>,
    github: Arc<RecordingGithub>,
    dispatcher: Dispatcher,
}

impl Harness {
    fn new(reactions: &[ReactionConfig]) -> Self {
        let room = Arc::new(MemoryRoom::new(BOT_ID));
        let events = perch_chat::ChatRoom::subscribe(room.as_ref()).expect("subscribe");
        let store = Arc::new(InMemoryBotStore::new());
        let github = Arc::new(RecordingGithub::default());
        let services = Arc::new(BotServices {
            store: store.clone(),
            github: github.clone(),
            github_owner: "perch-org".to_string(),
            registry: Arc::new(build_registry().expect("registry")),
            prefix: DEFAULT_PREFIX.to_string(),
        });
        let reactions = Reaction::compile_all(reactions).expect("reactions");
        let dispatcher = Dispatcher::new(services, room.clone(), reactions);
        Self {
            room,
            events,
            store,
            github,
            dispatcher,
        }
    }

    /// Posts `text` as `user_id` and returns what the bot sent in response.
    async fn say(&mut self, user_id: u64, text: &str) -> Vec<SentMessage> {
        let before = self.room.sent().len();
        self.room
            .inject(user_id, &format!("user{user_id}"), text)
            .await
            .expect("inject");
        let message = self.events.recv().await.expect("event");
        self.dispatcher.handle_message(&message).await;
        self.room.sent().split_off(before)
    }

    async fn reply(&mut self, user_id: u64, text: &str) -> String {
        let sent = self.say(user_id, text).await;
        assert_eq!(sent.len(), 1, "expected one reply to {text:?}, got {sent:?}");
        sent[0].text.clone()
    }

    async fn make_admin(&self, user_id: u64) {
        if self.store.get_group("admin").await.expect("get admin").is_none() {
            self.store.create_group("admin").await.expect("create admin");
        }
        self.store
            .upsert_user(user_id, &format!("user{user_id}"))
            .await
            .expect("upsert");
        self.store
            .add_membership(user_id, "admin", true)
            .await
            .expect("membership");
    }
}

#[tokio::test]
async fn functional_group_create_twice_reports_existing_group() {
    let mut harness = Harness::new(&[]);
    let sent = harness.say(5, "!!/group create \"foo\"").await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].text, "Created group _foo_.");
    assert_eq!(sent[0].reply_to.map(|id| id.0), Some(1));

    assert_eq!(
        harness.reply(5, "!!/group create \"foo\"").await,
        "Group 'foo' already exists"
    );
}

#[tokio::test]
async fn functional_unrestricted_operation_runs_for_user_without_groups() {
    let mut harness = Harness::new(&[]);
    let sent = harness.say(5, "!!/hello").await;
    assert_eq!(sent.len(), 1);
    assert!(crate::messages::HELLO.contains(&sent[0].text.as_str()));
    assert_eq!(sent[0].reply_to, None);

    let user = harness.store.get_user(5).await.expect("get").expect("user");
    assert_eq!(user.name, "user5");
    assert!(user.memberships.is_empty());
}

#[tokio::test]
async fn functional_unknown_top_level_name_falls_back_to_trick() {
    let mut harness = Harness::new(&[]);
    harness
        .store
        .set_trick("rtfm", "Read the docs first.")
        .await
        .expect("trick");
    assert_eq!(harness.reply(5, "!!/rtfm").await, "Read the docs first.");
    assert_eq!(
        harness.reply(5, "!!/nope").await,
        "There is no command named !!/nope."
    );
}

#[tokio::test]
async fn functional_group_nodes_list_their_subcommands() {
    let mut harness = Harness::new(&[]);
    assert_eq!(
        harness.reply(5, "!!/group frobnicate").await,
        "The group !!/group has no subcommand named \"frobnicate\". Its subcommands are: create, delete, list, manager, member, show"
    );
    assert_eq!(
        harness.reply(5, "!!/group member").await,
        "Subcommands of !!/group member are: add, remove"
    );
}

#[tokio::test]
async fn regression_parse_and_binding_errors_are_replied() {
    let mut harness = Harness::new(&[]);
    assert_eq!(
        harness.reply(5, "!!/group create \"foo").await,
        "Parse error: Unclosed string"
    );
    assert_eq!(
        harness.reply(5, "!!/group create 5").await,
        "Incorrect type supplied for argument `name`; expected **STRING** but got **INT**."
    );
    assert_eq!(
        harness.reply(5, "!!/hello there").await,
        "Superfluous arguments supplied starting at `there`."
    );
}

#[tokio::test]
async fn functional_restricted_command_requires_listed_group_or_admin() {
    let mut harness = Harness::new(&[]);
    harness.store.create_group("mods").await.expect("mods");
    harness
        .store
        .grant_command_permission("trick set", "mods")
        .await
        .expect("grant");

    assert_eq!(
        harness.reply(5, "!!/trick set \"x\" \"y\"").await,
        "Only members of groups _mods_ may run that command."
    );
    assert!(harness.store.get_trick("x").await.expect("get").is_none());

    harness.store.add_membership(5, "mods", false).await.expect("join");
    assert_eq!(
        harness.reply(5, "!!/trick set \"x\" \"y\"").await,
        "Saved trick !!/x."
    );

    harness.make_admin(9).await;
    assert_eq!(
        harness.reply(9, "!!/trick set name=\"z\" body=\"w\"").await,
        "Saved trick !!/z."
    );
}

#[tokio::test]
async fn functional_group_management_follows_manager_edges() {
    let mut harness = Harness::new(&[]);
    harness.make_admin(9).await;
    harness.reply(9, "!!/group create \"mods\"").await;
    harness
        .reply(9, "!!/group manager add \"mods\" \"admin\"")
        .await;

    assert_eq!(
        harness.reply(5, "!!/group member add \"mods\" 5").await,
        "Only members of groups _admin_ may manage the group _mods_."
    );
    assert_eq!(
        harness.reply(9, "!!/group member add \"mods\" 5").await,
        "Added user5 to _mods_."
    );
    assert_eq!(
        harness.reply(9, "!!/group delete \"admin\"").await,
        "The _admin_ group cannot be deleted."
    );
    assert_eq!(
        harness.reply(9, "!!/group member remove \"admin\" 9").await,
        "The membership of user 9 in _admin_ is protected."
    );
    assert_eq!(
        harness.reply(9, "!!/group delete \"mods\"").await,
        "Deleted group _mods_."
    );
    let user = harness.store.get_user(5).await.expect("get").expect("user");
    assert!(user.memberships.is_empty());
}

#[tokio::test]
async fn functional_help_describes_one_command_or_lists_all() {
    let mut harness = Harness::new(&[]);
    assert_eq!(
        harness.reply(5, "!!/help \"group create\"").await,
        "`!!/group create <name:STRING>`: Creates a permission group."
    );
    assert!(harness
        .reply(5, "!!/help")
        .await
        .starts_with("Commands: autolabel, goodbye, group, hello, help,"));

    assert_eq!(
        harness.reply(5, "!!/trick set \"help\" \"See the wiki.\"").await,
        "Saved trick !!/help."
    );
    assert_eq!(harness.reply(5, "!!/help").await, "See the wiki.");
    assert_eq!(
        harness.reply(5, "!!/trick set \"group\" \"Nope.\"").await,
        "!!/group is already a command."
    );
}

#[tokio::test]
async fn functional_issue_open_targets_configured_owner() {
    let mut harness = Harness::new(&[]);
    let reply = harness
        .reply(5, "!!/issue open \"bot\" \"It broke\" labels=[bug]")
        .await;
    assert_eq!(
        reply,
        "Opened [#7](https://github.com/perch-org/bot/issues/7) (It broke)"
    );
    let created = harness.github.created.lock().expect("created lock").clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].0, "perch-org/bot");
    assert_eq!(created[0].1.labels, vec!["bug".to_string()]);
    assert!(created[0]
        .1
        .body
        .as_deref()
        .is_some_and(|body| body.contains("user5")));

    assert_eq!(
        harness.reply(5, "!!/issue close \"bot\" 7").await,
        "GitHub request failed: issue 7 cannot be closed"
    );
}

#[tokio::test]
async fn functional_reactions_reply_and_run_commands() {
    let mut harness = Harness::new(&[
        ReactionConfig {
            pattern: "(?i)hello perch".into(),
            reply_to_self: false,
            command: None,
            messages: vec!["hi there".into()],
        },
        ReactionConfig {
            pattern: r"what is (?P<name>\w+)\?".into(),
            reply_to_self: false,
            command: Some("trick show".into()),
            messages: Vec::new(),
        },
    ]);
    harness
        .store
        .set_trick("perch", "A place for birds.")
        .await
        .expect("trick");

    assert_eq!(harness.reply(5, "Hello Perch").await, "hi there");
    assert!(harness.say(BOT_ID, "hello perch").await.is_empty());
    assert_eq!(harness.reply(5, "what is perch?").await, "A place for birds.");
    assert!(harness.say(5, "hello perch, how are you").await.is_empty());
}

#[tokio::test]
async fn regression_prefix_mid_message_is_ignored_entirely() {
    let mut harness = Harness::new(&[ReactionConfig {
        pattern: ".*".into(),
        reply_to_self: false,
        command: None,
        messages: vec!["echo".into()],
    }]);
    assert!(harness.say(5, "try !!/help sometime").await.is_empty());
    assert!(harness.say(5, "!!/").await.is_empty());
    assert_eq!(harness.reply(5, "plain chatter").await, "echo");
}
