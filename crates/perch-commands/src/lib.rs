//! Command text parsing, command tree resolution and argument binding.
//!
//! This crate is transport-agnostic: it turns command text into typed
//! arguments, walks a registered tree of operations, and binds arguments
//! against an operation's declared parameters. Executing operations is left
//! to the caller.

pub mod argument;
pub mod argument_binder;
pub mod command_parser;
pub mod command_tree;

pub use argument::{Argument, ArgumentKind, Value};
pub use argument_binder::{bind_arguments, BindError, BoundArguments};
pub use command_parser::{parse_command, ParseError, ParsedCommand};
pub use command_tree::{
    CommandNode, CommandTree, OperationDescriptor, Parameter, ParameterKind, RegistryError,
    Resolution, PATH_SEPARATOR,
};
