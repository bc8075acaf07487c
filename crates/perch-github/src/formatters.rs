//! Markdown fragments shared by webhook messages and `issue` operation replies.

use crate::payloads::{Account, Repository};

/// Escapes the characters chat markdown treats as formatting.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        if matches!(ch, '_' | '*' | '`' | '[' | ']') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

pub fn user_link(user: &Account) -> String {
    format!("[{}]({})", escape_markdown(&user.login), user.html_url)
}

/// Links a repository by `owner/name` when `full_name` is set, else by name.
pub fn repository_link(repository: &Repository, full_name: bool) -> String {
    let label = if full_name {
        &repository.full_name
    } else {
        &repository.name
    };
    format!("[{}]({})", escape_markdown(label), repository.html_url)
}

pub fn issue_link(number: u64, html_url: &str, title: &str) -> String {
    format!("[#{number}]({html_url}) ({title})")
}

pub fn ref_link(reference: &str, repository: &Repository) -> String {
    format!(
        "[{}/{reference}]({}/tree/{reference})",
        repository.name, repository.html_url
    )
}

/// Strips `refs/heads/` or `refs/tags/` from a push ref.
pub fn short_ref(reference: &str) -> &str {
    reference
        .strip_prefix("refs/heads/")
        .or_else(|| reference.strip_prefix("refs/tags/"))
        .unwrap_or(reference)
}

#[cfg(test)]
mod tests {
    use super::{escape_markdown, issue_link, ref_link, repository_link, short_ref, user_link};
    use crate::payloads::{Account, Repository};

    fn repository() -> Repository {
        Repository {
            name: "perch_bot".into(),
            full_name: "birds/perch_bot".into(),
            html_url: "https://github.com/birds/perch_bot".into(),
            owner: Account {
                login: "birds".into(),
                html_url: "https://github.com/birds".into(),
            },
        }
    }

    #[test]
    fn unit_escape_markdown_escapes_formatting_characters() {
        assert_eq!(escape_markdown("a_b*c`d[e]"), r"a\_b\*c\`d\[e\]");
        assert_eq!(escape_markdown("plain"), "plain");
    }

    #[test]
    fn unit_links_render_expected_markdown() {
        let user = Account {
            login: "night_owl".into(),
            html_url: "https://github.com/night_owl".into(),
        };
        assert_eq!(
            user_link(&user),
            r"[night\_owl](https://github.com/night_owl)"
        );
        assert_eq!(
            repository_link(&repository(), true),
            r"[birds/perch\_bot](https://github.com/birds/perch_bot)"
        );
        assert_eq!(
            repository_link(&repository(), false),
            r"[perch\_bot](https://github.com/birds/perch_bot)"
        );
        assert_eq!(
            issue_link(3, "https://github.com/birds/perch_bot/issues/3", "Crash"),
            "[#3](https://github.com/birds/perch_bot/issues/3) (Crash)"
        );
        assert_eq!(
            ref_link("main", &repository()),
            "[perch_bot/main](https://github.com/birds/perch_bot/tree/main)"
        );
    }

    #[test]
    fn unit_short_ref_strips_known_prefixes() {
        assert_eq!(short_ref("refs/heads/main"), "main");
        assert_eq!(short_ref("refs/tags/v1.0"), "v1.0");
        assert_eq!(short_ref("feature"), "feature");
    }
}
