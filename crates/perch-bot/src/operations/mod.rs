//! The operation catalog: every chat command Perch understands, registered
//! from an explicit table.

use std::future::Future;
use std::sync::Arc;

use perch_commands::{ArgumentKind, BoundArguments, OperationDescriptor, Parameter, RegistryError, Value};

use crate::{
    BotServices, InvocationContext, OperationBody, OperationResult, Registry,
    CURRENT_USER_CONTEXT, EVENT_CONTEXT,
};

mod autolabel;
mod general;
mod groups;
mod issues;
mod permissions;
mod tricks;

type Arguments = BoundArguments<InvocationContext>;

fn body<F, Fut>(handler: F) -> OperationBody
where
    F: Fn(Arc<BotServices>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    Arc::new(move |services, arguments| Box::pin(handler(services, arguments)))
}

fn operation<F, Fut>(path: &str, documentation: &str, handler: F) -> OperationDescriptor<OperationBody>
where
    F: Fn(Arc<BotServices>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = OperationResult> + Send + 'static,
{
    OperationDescriptor::new(path, documentation, body(handler))
}

fn string(name: &str) -> Parameter {
    Parameter::required(name, ArgumentKind::String)
}

fn int(name: &str) -> Parameter {
    Parameter::required(name, ArgumentKind::Int)
}

fn current_user() -> Parameter {
    Parameter::contextual(CURRENT_USER_CONTEXT)
}

/// Builds the full operation catalog.
pub fn build_registry() -> Result<Registry, RegistryError> {
    let mut registry = Registry::new();
    for descriptor in catalog() {
        registry.register(descriptor)?;
    }
    Ok(registry)
}

fn catalog() -> Vec<OperationDescriptor<OperationBody>> {
    vec![
        operation("help", "Shows the command list, or usage and documentation for one command.", general::help)
            .parameter(Parameter::optional("command", ArgumentKind::String)),
        operation("hello", "Says hello.", general::hello),
        operation("goodbye", "Says goodbye.", general::goodbye),
        operation("hug", "Hugs the caller.", general::hug)
            .parameter(Parameter::contextual(EVENT_CONTEXT)),
        operation("user.show", "Shows a user's group memberships; defaults to the caller.", general::user_show)
            .parameter(Parameter::optional("user", ArgumentKind::Int))
            .parameter(current_user()),
        operation("group.list", "Lists permission groups.", groups::list),
        operation("group.show", "Shows a group's members and management edges.", groups::show)
            .parameter(string("name")),
        operation("group.create", "Creates a permission group.", groups::create)
            .parameter(string("name")),
        operation("group.delete", "Deletes a permission group you can manage.", groups::delete)
            .parameter(string("name"))
            .parameter(current_user()),
        operation("group.member.add", "Adds a user to a group you can manage.", groups::member_add)
            .parameter(string("group"))
            .parameter(int("user"))
            .parameter(
                Parameter::choice("protected", &["yes", "no"]).with_default(Value::Flag("no".into())),
            )
            .parameter(current_user()),
        operation("group.member.remove", "Removes a user from a group you can manage.", groups::member_remove)
            .parameter(string("group"))
            .parameter(int("user"))
            .parameter(current_user()),
        operation("group.manager.add", "Lets members of `manager` manage `group`.", groups::manager_add)
            .parameter(string("group"))
            .parameter(string("manager"))
            .parameter(current_user()),
        operation("group.manager.remove", "Stops members of `manager` managing `group`.", groups::manager_remove)
            .parameter(string("group"))
            .parameter(string("manager"))
            .parameter(current_user()),
        operation("permission.list", "Lists which groups may run restricted commands.", permissions::list)
            .parameter(Parameter::optional("command", ArgumentKind::String)),
        operation("permission.grant", "Allows a group to run a command (admins only).", permissions::grant)
            .parameter(string("command"))
            .parameter(string("group"))
            .parameter(current_user()),
        operation("permission.revoke", "Revokes a group's permission to run a command (admins only).", permissions::revoke)
            .parameter(string("command"))
            .parameter(string("group"))
            .parameter(current_user()),
        operation("trick.list", "Lists tricks.", tricks::list),
        operation("trick.show", "Shows a trick's text.", tricks::show).parameter(string("name")),
        operation("trick.set", "Creates or replaces a trick.", tricks::set)
            .parameter(string("name"))
            .parameter(string("body")),
        operation("trick.delete", "Deletes a trick.", tricks::delete).parameter(string("name")),
        operation("autolabel.list", "Lists autolabel rules, optionally for one repository.", autolabel::list)
            .parameter(Parameter::optional("repository", ArgumentKind::String)),
        operation("autolabel.add", "Adds a rule labelling new pull requests by base branch or linked issue label.", autolabel::add)
            .parameter(string("repository"))
            .parameter(Parameter::choice("kind", &["branch_name", "linked_issue"]))
            .parameter(string("match"))
            .parameter(string("label")),
        operation("autolabel.remove", "Removes an autolabel rule by id.", autolabel::remove)
            .parameter(int("id")),
        operation("issue.open", "Opens an issue in one of the organization's repositories.", issues::open)
            .parameter(string("repository"))
            .parameter(string("title"))
            .parameter(Parameter::optional("body", ArgumentKind::String))
            .parameter(Parameter::optional("labels", ArgumentKind::StringArray))
            .parameter(current_user()),
        operation("issue.close", "Closes an issue.", issues::close)
            .parameter(string("repository"))
            .parameter(int("number"))
            .parameter(
                Parameter::choice("reason", &["completed", "not_planned"])
                    .with_default(Value::Flag("completed".into())),
            ),
    ]
}

/// Formats names as `_a_, _b_`.
fn emphasized_list<'a>(names: impl IntoIterator<Item = &'a str>) -> String {
    names
        .into_iter()
        .map(|name| format!("_{name}_"))
        .collect::<Vec<_>>()
        .join(", ")
}
