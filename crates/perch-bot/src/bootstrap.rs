//! Process wiring for the `perch` binary.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use perch_access::ADMIN_GROUP;
use perch_chat::{ChatRoom, ConsoleRoom, ConsoleRoomConfig};
use perch_github::{
    run_webhook_server, GithubApi, GithubApiClient, GithubClientConfig, WebhookReporter,
    WebhookServerState,
};
use perch_store::{BotStore, InMemoryBotStore, SqliteBotStore};
use tokio::sync::watch;
use tracing_subscriber::{filter::LevelFilter, EnvFilter};

use crate::config::{Cli, SupplementaryConfig};
use crate::operations::build_registry;
use crate::reactions::Reaction;
use crate::{BotServices, Dispatcher};

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub fn open_store(database_path: Option<&Path>) -> Result<Arc<dyn BotStore>> {
    match database_path {
        Some(path) => {
            let store = SqliteBotStore::new(path)
                .with_context(|| format!("failed to open database {}", path.display()))?;
            tracing::info!(path = %path.display(), "using sqlite store");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("no database path configured; state will not survive a restart");
            Ok(Arc::new(InMemoryBotStore::new()))
        }
    }
}

/// Makes sure the `admin` group exists and, when `admin` is given, that the
/// user holds a protected membership in it.
pub async fn ensure_admin_group(store: &dyn BotStore, admin: Option<(u64, &str)>) -> Result<()> {
    if store.get_group(ADMIN_GROUP).await?.is_none() {
        store.create_group(ADMIN_GROUP).await?;
        tracing::info!("created admin group");
    }
    let Some((user_id, name)) = admin else {
        return Ok(());
    };
    let user = match store.get_user(user_id).await? {
        Some(user) => user,
        None => store.upsert_user(user_id, name).await?,
    };
    if user.membership(ADMIN_GROUP).is_none() {
        store.add_membership(user_id, ADMIN_GROUP, true).await?;
        tracing::info!(user_id, "granted protected admin membership");
    }
    Ok(())
}

/// Runs the webhook server and the chat dispatcher until Ctrl-C, the end of
/// console input, or a server failure.
pub async fn run(cli: Cli) -> Result<()> {
    let supplementary = SupplementaryConfig::load_optional(cli.config.as_deref())?;
    let reactions =
        Reaction::compile_all(&supplementary.reactions).context("invalid reaction configuration")?;

    let store = open_store(cli.database_path.as_deref())?;
    ensure_admin_group(
        store.as_ref(),
        cli.admin_user_id.map(|id| (id, cli.admin_name.as_str())),
    )
    .await
    .context("failed to bootstrap the admin group")?;

    let github: Arc<dyn GithubApi> = Arc::new(GithubApiClient::new(GithubClientConfig {
        api_base: cli.github_api_base.clone(),
        token: cli.github_token.clone(),
        request_timeout_ms: cli.github_request_timeout_ms,
        retry_max_attempts: cli.github_retry_max_attempts,
        retry_base_delay_ms: cli.github_retry_base_delay_ms,
    })?);
    let room: Arc<dyn ChatRoom> = Arc::new(ConsoleRoom::new(ConsoleRoomConfig {
        bot_user_id: cli.bot_user_id,
        operator_user_id: cli.operator_user_id,
        operator_name: cli.operator_name.clone(),
    }));
    let registry = build_registry().context("failed to build the operation registry")?;
    let services = Arc::new(BotServices {
        store: Arc::clone(&store),
        github: Arc::clone(&github),
        github_owner: cli.github_owner.clone(),
        registry: Arc::new(registry),
        prefix: cli.command_prefix.clone(),
    });

    let webhook_state = Arc::new(WebhookServerState {
        secret: cli.webhook_secret.clone(),
        ignored_repositories: supplementary.ignored_repositories,
        reporter: WebhookReporter::new(Arc::clone(&room), store, github),
    });
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    let bind = cli.webhook_bind.to_string();
    let mut server = tokio::spawn(async move {
        run_webhook_server(&bind, webhook_state, async move {
            let _ = shutdown_rx.changed().await;
        })
        .await
    });

    let dispatcher = Dispatcher::new(services, room, reactions);
    tokio::select! {
        result = dispatcher.run() => result?,
        joined = &mut server => {
            return joined.context("webhook server task failed")?;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown requested");
        }
    }

    let _ = shutdown_tx.send(true);
    server.await.context("webhook server task failed")??;
    tracing::info!("perch stopped");
    Ok(())
}
