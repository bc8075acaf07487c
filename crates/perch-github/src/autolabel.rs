//! Label rules applied to newly opened pull requests.
//!
//! `branch_name` rules match their pattern against the whole base branch
//! name. `linked_issue` rules fire when an issue the pull request closes
//! carries a label equal to the rule's pattern.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use perch_store::{AutolabelKind, AutolabelRule, BotStore};
use regex::Regex;

use crate::api::{GithubApi, RepoRef};
use crate::payloads::{Issue, PullRequest};

const LINKED_ISSUE_PATTERN: &str =
    r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?)\s+#(\d+)\b";

/// Issue numbers referenced with a closing keyword, first occurrence order.
pub fn linked_issue_numbers(body: &str) -> Result<Vec<u64>> {
    let pattern = Regex::new(LINKED_ISSUE_PATTERN).context("invalid linked issue pattern")?;
    let mut numbers = Vec::new();
    for captures in pattern.captures_iter(body) {
        let Some(number) = captures
            .get(1)
            .and_then(|digits| digits.as_str().parse::<u64>().ok())
        else {
            continue;
        };
        if !numbers.contains(&number) {
            numbers.push(number);
        }
    }
    Ok(numbers)
}

fn full_match(pattern: &str, text: &str) -> Option<bool> {
    match Regex::new(&format!("^(?:{pattern})$")) {
        Ok(regex) => Some(regex.is_match(text)),
        Err(error) => {
            tracing::warn!(pattern, %error, "skipping autolabel rule with invalid pattern");
            None
        }
    }
}

/// Labels the rules want on `pull`, excluding those it already carries.
pub fn queued_labels(
    rules: &[AutolabelRule],
    pull: &PullRequest,
    linked_issues: &[Issue],
) -> Vec<String> {
    let mut queued: Vec<String> = Vec::new();
    for rule in rules {
        let matched = match rule.kind {
            AutolabelKind::BranchName => {
                full_match(&rule.pattern, &pull.base.reference).unwrap_or(false)
            }
            AutolabelKind::LinkedIssue => linked_issues
                .iter()
                .any(|issue| issue.has_label(&rule.pattern)),
        };
        let already_present = pull.labels.iter().any(|label| label.name == rule.label);
        if matched && !already_present && !queued.contains(&rule.label) {
            queued.push(rule.label.clone());
        }
    }
    queued
}

/// Evaluates the repository's rules for a newly opened pull request and
/// applies the result with a single label update. Returns the labels added.
pub async fn autolabel_pull_request(
    github: &dyn GithubApi,
    store: &dyn BotStore,
    repo: &RepoRef,
    pull: &PullRequest,
) -> Result<Vec<String>> {
    let rules = store
        .autolabel_rules(Some(&repo.name))
        .await
        .context("failed to load autolabel rules")?;
    if rules.is_empty() {
        return Ok(Vec::new());
    }

    let mut linked_issues: BTreeMap<u64, Issue> = BTreeMap::new();
    if rules
        .iter()
        .any(|rule| rule.kind == AutolabelKind::LinkedIssue)
    {
        for number in linked_issue_numbers(pull.body.as_deref().unwrap_or_default())? {
            match github.get_issue(repo, number).await {
                Ok(issue) => {
                    linked_issues.insert(number, issue);
                }
                Err(error) => {
                    tracing::warn!(repository = %repo, issue = number, error = %error, "failed to fetch linked issue");
                }
            }
        }
    }

    let linked_issues = linked_issues.into_values().collect::<Vec<_>>();
    let queued = queued_labels(&rules, pull, &linked_issues);
    if queued.is_empty() {
        return Ok(queued);
    }

    let labels = pull
        .labels
        .iter()
        .map(|label| label.name.clone())
        .chain(queued.iter().cloned())
        .collect::<Vec<_>>();
    github
        .update_issue_labels(repo, pull.number, &labels)
        .await
        .with_context(|| format!("failed to apply autolabels to {repo}#{}", pull.number))?;
    tracing::debug!(repository = %repo, pull = pull.number, labels = ?queued, "applied autolabels");
    Ok(queued)
}

#[cfg(test)]
mod tests {
    use perch_store::{AutolabelKind, AutolabelRule};

    use super::{linked_issue_numbers, queued_labels};
    use crate::payloads::{BranchRef, Issue, Label, PullRequest};

    fn pull(base: &str, labels: &[&str]) -> PullRequest {
        PullRequest {
            number: 12,
            title: "Fix crash".into(),
            html_url: "https://github.com/birds/perch/pull/12".into(),
            body: None,
            labels: labels
                .iter()
                .map(|name| Label {
                    name: name.to_string(),
                })
                .collect(),
            merged: false,
            head: BranchRef {
                reference: "fix-crash".into(),
            },
            base: BranchRef {
                reference: base.into(),
            },
        }
    }

    fn rule(id: i64, kind: AutolabelKind, pattern: &str, label: &str) -> AutolabelRule {
        AutolabelRule {
            id,
            repository: "perch".into(),
            kind,
            pattern: pattern.into(),
            label: label.into(),
        }
    }

    fn issue(number: u64, labels: &[&str]) -> Issue {
        Issue {
            number,
            title: "Crash".into(),
            html_url: format!("https://github.com/birds/perch/issues/{number}"),
            body: None,
            labels: labels
                .iter()
                .map(|name| Label {
                    name: name.to_string(),
                })
                .collect(),
            state_reason: None,
        }
    }

    #[test]
    fn unit_linked_issue_numbers_recognizes_closing_keywords() {
        let body = "Fixes #3, closes #4 and RESOLVED #5.\nfix #3 again; close#6; refs #7; fixed #8";
        assert_eq!(linked_issue_numbers(body).expect("scan"), vec![3, 4, 5, 8]);
        assert!(linked_issue_numbers("").expect("scan").is_empty());
    }

    #[test]
    fn functional_queued_labels_match_branch_names_fully() {
        let rules = vec![
            rule(1, AutolabelKind::BranchName, "release/.*", "release"),
            rule(2, AutolabelKind::BranchName, "main", "mainline"),
        ];
        assert_eq!(
            queued_labels(&rules, &pull("release/1.2", &[]), &[]),
            vec!["release".to_string()]
        );
        assert!(queued_labels(&rules, &pull("not-main", &[]), &[]).is_empty());
    }

    #[test]
    fn functional_queued_labels_follow_linked_issue_labels() {
        let rules = vec![
            rule(1, AutolabelKind::LinkedIssue, "bug", "needs-triage"),
            rule(2, AutolabelKind::LinkedIssue, "docs", "documentation"),
        ];
        assert_eq!(
            queued_labels(&rules, &pull("main", &[]), &[issue(3, &["bug"])]),
            vec!["needs-triage".to_string()]
        );
        assert!(queued_labels(&rules, &pull("main", &["needs-triage"]), &[issue(3, &["bug"])])
            .is_empty());
    }

    #[test]
    fn regression_invalid_branch_pattern_is_skipped() {
        let rules = vec![
            rule(1, AutolabelKind::BranchName, "(unclosed", "broken"),
            rule(2, AutolabelKind::BranchName, "main", "mainline"),
        ];
        assert_eq!(
            queued_labels(&rules, &pull("main", &[]), &[]),
            vec!["mainline".to_string()]
        );
    }
}
