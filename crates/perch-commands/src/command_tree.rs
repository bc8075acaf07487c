//! Registry of operations arranged as a tree of named command groups.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::argument::{Argument, ArgumentKind, Value};

/// Separator used in declared operation paths such as `group.member.add`.
pub const PATH_SEPARATOR: char = '.';

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Startup-time registration failures.
pub enum RegistryError {
    #[error("operation path '{path}' contains an empty segment")]
    EmptySegment { path: String },
    #[error("a command named '{path}' is already registered")]
    DuplicateCommand { path: String },
    #[error("'{path}' is a command group and cannot also be a command")]
    GroupRedefinedAsCommand { path: String },
    #[error("'{path}' is a command and cannot also be a command group")]
    CommandRedefinedAsGroup { path: String },
    #[error("operation '{path}' declares parameter '{parameter}' more than once")]
    DuplicateParameter { path: String, parameter: String },
}

#[derive(Debug, Clone, PartialEq)]
/// Expected shape of a parameter's value.
pub enum ParameterKind {
    Plain(ArgumentKind),
    /// A bareword restricted to the listed values (case-sensitive).
    Choice(Vec<String>),
    /// A value of the given kind that may be left out; defaults to `Value::None`.
    Optional(ArgumentKind),
    /// Supplied by the dispatcher from ambient context, never by the user.
    Context,
}

impl ParameterKind {
    pub fn describe(&self) -> String {
        match self {
            Self::Plain(kind) | Self::Optional(kind) => kind.to_string(),
            Self::Choice(choices) => choices.join("/"),
            Self::Context => "CONTEXT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub kind: ParameterKind,
    pub default: Option<Value>,
}

impl Parameter {
    pub fn required(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Plain(kind),
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ArgumentKind) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Optional(kind),
            default: Some(Value::None),
        }
    }

    pub fn choice(name: impl Into<String>, choices: &[&str]) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Choice(choices.iter().map(|choice| choice.to_string()).collect()),
            default: None,
        }
    }

    pub fn contextual(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParameterKind::Context,
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn is_contextual(&self) -> bool {
        matches!(self.kind, ParameterKind::Context)
    }

    /// `<name:KIND>` for required parameters, `[name:KIND]` when a default exists.
    pub fn usage(&self) -> String {
        let inner = format!("{}:{}", self.name, self.kind.describe());
        if self.default.is_some() {
            format!("[{inner}]")
        } else {
            format!("<{inner}>")
        }
    }
}

#[derive(Debug, Clone)]
/// A callable leaf of the command tree.
pub struct OperationDescriptor<B> {
    path: String,
    parameters: Vec<Parameter>,
    documentation: String,
    body: B,
}

impl<B> OperationDescriptor<B> {
    pub fn new(path: impl Into<String>, documentation: impl Into<String>, body: B) -> Self {
        Self {
            path: path.into(),
            parameters: Vec::new(),
            documentation: documentation.into(),
            body,
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameters.push(parameter);
        self
    }

    /// The declared, separator-joined path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The path as typed in chat, e.g. `group member add`.
    pub fn name(&self) -> String {
        self.path.replace(PATH_SEPARATOR, " ")
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }

    pub fn body(&self) -> &B {
        &self.body
    }

    pub fn usage(&self) -> String {
        let mut usage = self.name();
        for parameter in self.parameters.iter().filter(|p| !p.is_contextual()) {
            usage.push(' ');
            usage.push_str(&parameter.usage());
        }
        usage
    }
}

#[derive(Debug, Clone)]
pub enum CommandNode<B> {
    Group(CommandTree<B>),
    Leaf(OperationDescriptor<B>),
}

#[derive(Debug, Clone)]
pub struct CommandTree<B> {
    children: BTreeMap<String, CommandNode<B>>,
}

impl<B> Default for CommandTree<B> {
    fn default() -> Self {
        Self {
            children: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
/// Outcome of walking positional arguments down the tree.
pub enum Resolution<'t, 'a, B> {
    /// A leaf was reached; `arguments` are the ones after its name.
    Leaf {
        descriptor: &'t OperationDescriptor<B>,
        path: Vec<String>,
        arguments: &'a [Argument],
    },
    /// Names ran out while on a group; `path` is empty for the root.
    Group {
        path: Vec<String>,
        group: &'t CommandTree<B>,
    },
    /// `name` is not a child of the group found at `parent`.
    Unknown {
        parent: Vec<String>,
        name: String,
        group: &'t CommandTree<B>,
    },
}

impl<B> CommandTree<B> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: OperationDescriptor<B>) -> Result<(), RegistryError> {
        let path = descriptor.path().to_string();
        let segments = path.split(PATH_SEPARATOR).collect::<Vec<_>>();
        if segments.iter().any(|segment| segment.trim().is_empty()) {
            return Err(RegistryError::EmptySegment { path });
        }
        let mut seen = BTreeSet::new();
        for parameter in descriptor.parameters() {
            if !seen.insert(parameter.name.as_str()) {
                return Err(RegistryError::DuplicateParameter {
                    path,
                    parameter: parameter.name.clone(),
                });
            }
        }

        let Some((leaf_name, group_names)) = segments.split_last() else {
            return Err(RegistryError::EmptySegment { path });
        };
        let mut tree = self;
        for (depth, group_name) in group_names.iter().enumerate() {
            let node = tree
                .children
                .entry(group_name.to_string())
                .or_insert_with(|| CommandNode::Group(CommandTree::new()));
            tree = match node {
                CommandNode::Group(child) => child,
                CommandNode::Leaf(_) => {
                    return Err(RegistryError::CommandRedefinedAsGroup {
                        path: segments[..=depth].join(" "),
                    })
                }
            };
        }

        match tree.children.entry(leaf_name.to_string()) {
            Entry::Occupied(existing) => Err(match existing.get() {
                CommandNode::Group(_) => RegistryError::GroupRedefinedAsCommand {
                    path: segments.join(" "),
                },
                CommandNode::Leaf(_) => RegistryError::DuplicateCommand {
                    path: segments.join(" "),
                },
            }),
            Entry::Vacant(slot) => {
                tracing::debug!(operation = path.as_str(), "registered operation");
                slot.insert(CommandNode::Leaf(descriptor));
                Ok(())
            }
        }
    }

    pub fn child_names(&self) -> Vec<&str> {
        self.children.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn split<'t, 'a>(&'t self, arguments: &'a [Argument]) -> Resolution<'t, 'a, B> {
        let mut tree = self;
        let mut path = Vec::new();
        for (index, argument) in arguments.iter().enumerate() {
            let Some(name) = argument.as_flag() else {
                break;
            };
            match tree.children.get(name) {
                None => {
                    return Resolution::Unknown {
                        parent: path,
                        name: name.to_string(),
                        group: tree,
                    }
                }
                Some(CommandNode::Group(child)) => {
                    path.push(name.to_string());
                    tree = child;
                }
                Some(CommandNode::Leaf(descriptor)) => {
                    path.push(name.to_string());
                    return Resolution::Leaf {
                        descriptor,
                        path,
                        arguments: &arguments[index + 1..],
                    };
                }
            }
        }
        Resolution::Group { path, group: tree }
    }

    /// Looks up a leaf by its chat name (`group create`).
    pub fn find(&self, name: &str) -> Option<&OperationDescriptor<B>> {
        let mut tree = self;
        let mut segments = name.split_whitespace().peekable();
        while let Some(segment) = segments.next() {
            match tree.children.get(segment)? {
                CommandNode::Group(child) => tree = child,
                CommandNode::Leaf(descriptor) => {
                    return segments.peek().is_none().then_some(descriptor)
                }
            }
        }
        None
    }

    /// Every registered operation, depth-first in name order.
    pub fn descriptors(&self) -> Vec<&OperationDescriptor<B>> {
        let mut found = Vec::new();
        for node in self.children.values() {
            match node {
                CommandNode::Group(child) => found.extend(child.descriptors()),
                CommandNode::Leaf(descriptor) => found.push(descriptor),
            }
        }
        found
    }
}
