use std::{path::Path, sync::Arc, time::Duration};

use httpmock::prelude::*;
use perch_bot::bootstrap::{ensure_admin_group, open_store};
use perch_bot::operations::build_registry;
use perch_bot::reactions::{Reaction, ReactionConfig};
use perch_bot::{BotServices, Dispatcher, DEFAULT_PREFIX};
use perch_chat::{MemoryRoom, SentMessage};
use perch_github::{GithubApiClient, GithubClientConfig};
use serde_json::json;
use tokio::task::JoinHandle;

const BOT_ID: u64 = 1;
const ADMIN_ID: u64 = 100;

struct RunningBot {
    room: Arc<MemoryRoom>,
    task: JoinHandle<()>,
}

impl RunningBot {
    async fn start(database: &Path, github_base: String, reactions: &[ReactionConfig]) -> Self {
        let store = open_store(Some(database)).expect("store");
        ensure_admin_group(store.as_ref(), Some((ADMIN_ID, "root")))
            .await
            .expect("admin bootstrap");
        let github = GithubApiClient::new(GithubClientConfig {
            api_base: github_base,
            token: "token".to_string(),
            request_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        })
        .expect("github client");
        let services = Arc::new(BotServices {
            store,
            github: Arc::new(github),
            github_owner: "octo".to_string(),
            registry: Arc::new(build_registry().expect("registry")),
            prefix: DEFAULT_PREFIX.to_string(),
        });

        let room = Arc::new(MemoryRoom::new(BOT_ID));
        let dispatcher = Dispatcher::new(
            services,
            room.clone(),
            Reaction::compile_all(reactions).expect("reactions"),
        );
        let task = tokio::spawn(async move {
            dispatcher.run().await.expect("dispatcher");
        });
        Self { room, task }
    }

    /// Sends `text` as `user_id` and waits for the next bot message.
    async fn ask(&self, user_id: u64, name: &str, text: &str) -> SentMessage {
        let before = self.room.sent().len();
        let message_id = self.room.inject(user_id, name, text).await.expect("inject");
        for _ in 0..200 {
            if let Some(reply) = self.room.sent().get(before) {
                assert_eq!(reply.reply_to, Some(message_id), "reply to {text:?}");
                return reply.clone();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("no reply to {text:?}");
    }
}

impl Drop for RunningBot {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[tokio::test]
async fn integration_permissions_and_tricks_persist_across_restart() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let database = workspace.path().join("perch.sqlite3");

    {
        let bot = RunningBot::start(&database, "http://127.0.0.1:9".to_string(), &[]).await;
        assert_eq!(
            bot.ask(ADMIN_ID, "root", "!!/group create \"mods\"").await.text,
            "Created group _mods_."
        );
        assert_eq!(
            bot.ask(5, "wren", "!!/user show").await.text,
            "wren (ID 5) is not a member of any groups."
        );
        assert_eq!(
            bot.ask(ADMIN_ID, "root", "!!/group member add \"mods\" 5").await.text,
            "Added wren to _mods_."
        );
        assert_eq!(
            bot.ask(ADMIN_ID, "root", "!!/permission grant \"trick set\" \"mods\"")
                .await
                .text,
            "Members of _mods_ may now run !!/trick set."
        );
        assert_eq!(
            bot.ask(6, "finch", "!!/trick set \"faq\" \"Read the FAQ.\"")
                .await
                .text,
            "Only members of groups _mods_ may run that command."
        );
        assert_eq!(
            bot.ask(5, "wren", "!!/trick set \"faq\" \"Read the FAQ.\"")
                .await
                .text,
            "Saved trick !!/faq."
        );
    }

    let bot = RunningBot::start(&database, "http://127.0.0.1:9".to_string(), &[]).await;
    assert_eq!(bot.ask(6, "finch", "!!/faq").await.text, "Read the FAQ.");
    assert_eq!(
        bot.ask(6, "finch", "!!/permission list \"trick set\"").await.text,
        "Members of _mods_ may run !!/trick set."
    );
    assert_eq!(
        bot.ask(6, "finch", "!!/user show 5").await.text,
        "wren (ID 5) is a member of _mods_."
    );
    assert_eq!(
        bot.ask(6, "finch", "!!/group delete \"admin\"").await.text,
        "The _admin_ group cannot be deleted."
    );
}

#[tokio::test]
async fn integration_issue_open_posts_to_github_and_links_the_result() {
    let github = MockServer::start();
    let create = github.mock(|when, then| {
        when.method(POST)
            .path("/repos/octo/widgets/issues")
            .header("authorization", "Bearer token")
            .json_body(json!({
                "title": "Crash on start",
                "labels": ["bug"],
                "body": "_Opened from chat by wren._"
            }));
        then.status(201).json_body(json!({
            "number": 21,
            "title": "Crash on start",
            "html_url": "https://github.com/octo/widgets/issues/21",
            "labels": [{ "name": "bug" }]
        }));
    });
    let workspace = tempfile::tempdir().expect("tempdir");
    let bot = RunningBot::start(&workspace.path().join("perch.sqlite3"), github.base_url(), &[]).await;

    let reply = bot
        .ask(5, "wren", "!!/issue open \"widgets\" \"Crash on start\" labels=[bug]")
        .await;

    create.assert_calls(1);
    assert_eq!(
        reply.text,
        "Opened [#21](https://github.com/octo/widgets/issues/21) (Crash on start)"
    );
}

#[tokio::test]
async fn integration_reaction_dispatches_command_with_captures() {
    let workspace = tempfile::tempdir().expect("tempdir");
    let reactions = [ReactionConfig {
        pattern: r"(?i)what does (?P<command>[a-z ]+) do\?".to_string(),
        reply_to_self: false,
        command: Some("help".to_string()),
        messages: Vec::new(),
    }];
    let bot = RunningBot::start(
        &workspace.path().join("perch.sqlite3"),
        "http://127.0.0.1:9".to_string(),
        &reactions,
    )
    .await;

    assert_eq!(
        bot.ask(5, "wren", "What does group list do?").await.text,
        "`!!/group list`: Lists permission groups."
    );
}
