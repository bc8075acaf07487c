use std::sync::Arc;

use perch_store::{AutolabelKind, NewAutolabelRule};
use regex::Regex;

use crate::{BotServices, CommandError, OperationResult, Reply};

use super::Arguments;

pub(super) async fn list(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let repository = arguments.optional_string("repository")?;
    let rules = services.store.autolabel_rules(repository).await?;
    if rules.is_empty() {
        return Ok(Some(Reply::Here("There are no autolabel rules.".to_string())));
    }
    let lines = rules
        .iter()
        .map(|rule| {
            format!(
                "#{} {}: {} `{}` -> {}",
                rule.id, rule.repository, rule.kind, rule.pattern, rule.label
            )
        })
        .collect::<Vec<_>>();
    Ok(Some(Reply::Here(lines.join("\n"))))
}

pub(super) async fn add(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let kind_name = arguments.flag("kind")?;
    let kind = AutolabelKind::parse(kind_name)
        .ok_or_else(|| CommandError::message(format!("Unknown rule kind {kind_name}.")))?;
    let pattern = arguments.string("match")?;
    if kind == AutolabelKind::BranchName {
        Regex::new(pattern)
            .map_err(|error| CommandError::message(format!("Invalid branch pattern: {error}")))?;
    }
    let rule = services
        .store
        .add_autolabel_rule(NewAutolabelRule {
            repository: arguments.string("repository")?.to_string(),
            kind,
            pattern: pattern.to_string(),
            label: arguments.string("label")?.to_string(),
        })
        .await?;
    tracing::info!(rule = rule.id, repository = rule.repository.as_str(), "added autolabel rule");
    Ok(Some(Reply::Here(format!(
        "Added autolabel rule #{}: {} pull requests get `{}`.",
        rule.id, rule.repository, rule.label
    ))))
}

pub(super) async fn remove(services: Arc<BotServices>, arguments: Arguments) -> OperationResult {
    let rule = services
        .store
        .remove_autolabel_rule(arguments.int("id")?)
        .await?;
    Ok(Some(Reply::Here(format!(
        "Removed autolabel rule #{} from {}.",
        rule.id, rule.repository
    ))))
}
