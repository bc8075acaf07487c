//! Matches parsed arguments against an operation's declared parameters.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::argument::{Argument, ArgumentKind, Value};
use crate::command_tree::{OperationDescriptor, Parameter, ParameterKind};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// User-facing binding failures. Binding stops at the first one.
pub enum BindError {
    #[error("Superfluous arguments supplied starting at `{first}`.")]
    Superfluous { first: String },
    #[error("Argument `{name}` cannot be supplied explicitly.")]
    Illegal { name: String },
    #[error("Unknown argument `{name}` supplied.")]
    Unknown { name: String },
    #[error("Multiple values supplied for argument `{name}`.")]
    Duplicate { name: String },
    #[error("Invalid value supplied for argument `{name}`; expected one of {choices}.")]
    InvalidChoice { name: String, choices: String },
    #[error(
        "Incorrect type supplied for argument `{name}`; expected **{expected}** but got **{actual}**."
    )]
    TypeMismatch {
        name: String,
        expected: String,
        actual: ArgumentKind,
    },
    #[error("Argument `{name}` not provided, expected a value of type **{expected}**.")]
    NotProvided { name: String, expected: String },
    #[error("Argument `{name}` is not bound as a value of type **{expected}**.")]
    Unbound { name: String, expected: String },
}

#[derive(Debug, Clone)]
/// Parameter values ready for an operation body, plus contextual values.
pub struct BoundArguments<C> {
    values: BTreeMap<String, Value>,
    context: BTreeMap<String, C>,
}

pub fn bind_arguments<B, C: Clone>(
    descriptor: &OperationDescriptor<B>,
    positional: &[Argument],
    explicit: &BTreeMap<String, Argument>,
    context: &BTreeMap<String, C>,
) -> Result<BoundArguments<C>, BindError> {
    let mut values = BTreeMap::new();

    let mut user_parameters = descriptor
        .parameters()
        .iter()
        .filter(|parameter| !parameter.is_contextual());
    for argument in positional {
        let Some(parameter) = user_parameters.next() else {
            return Err(BindError::Superfluous {
                first: argument.display_text(),
            });
        };
        values.insert(parameter.name.clone(), checked_value(parameter, argument)?);
    }

    for (name, argument) in explicit {
        let Some(parameter) = descriptor
            .parameters()
            .iter()
            .find(|parameter| &parameter.name == name)
        else {
            return Err(BindError::Unknown { name: name.clone() });
        };
        if parameter.is_contextual() {
            return Err(BindError::Illegal { name: name.clone() });
        }
        if values.contains_key(name) {
            return Err(BindError::Duplicate { name: name.clone() });
        }
        values.insert(name.clone(), checked_value(parameter, argument)?);
    }

    for parameter in descriptor.parameters() {
        if parameter.is_contextual() || values.contains_key(&parameter.name) {
            continue;
        }
        let Some(default) = parameter.default.clone() else {
            return Err(BindError::NotProvided {
                name: parameter.name.clone(),
                expected: parameter.kind.describe(),
            });
        };
        values.insert(parameter.name.clone(), default);
    }

    let bound_context = descriptor
        .parameters()
        .iter()
        .filter(|parameter| parameter.is_contextual())
        .filter_map(|parameter| {
            context
                .get(&parameter.name)
                .map(|value| (parameter.name.clone(), value.clone()))
        })
        .collect();

    Ok(BoundArguments {
        values,
        context: bound_context,
    })
}

fn checked_value(parameter: &Parameter, argument: &Argument) -> Result<Value, BindError> {
    let expected = match &parameter.kind {
        ParameterKind::Choice(choices) => {
            return match argument {
                Argument::Flag(value) if choices.contains(value) => Ok(Value::Flag(value.clone())),
                Argument::Flag(_) => Err(BindError::InvalidChoice {
                    name: parameter.name.clone(),
                    choices: choices.join("/"),
                }),
                other => Err(BindError::TypeMismatch {
                    name: parameter.name.clone(),
                    expected: ArgumentKind::Flag.to_string(),
                    actual: other.kind(),
                }),
            };
        }
        ParameterKind::Plain(kind) | ParameterKind::Optional(kind) => *kind,
        ParameterKind::Context => {
            return Err(BindError::Illegal {
                name: parameter.name.clone(),
            })
        }
    };
    if argument.kind() != expected {
        return Err(BindError::TypeMismatch {
            name: parameter.name.clone(),
            expected: expected.to_string(),
            actual: argument.kind(),
        });
    }
    Ok(Value::from(argument.clone()))
}

impl<C> BoundArguments<C> {
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn context(&self, name: &str) -> Option<&C> {
        self.context.get(name)
    }

    fn unbound(name: &str, expected: ArgumentKind) -> BindError {
        BindError::Unbound {
            name: name.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn string(&self, name: &str) -> Result<&str, BindError> {
        self.optional_string(name)?
            .ok_or_else(|| Self::unbound(name, ArgumentKind::String))
    }

    pub fn optional_string(&self, name: &str) -> Result<Option<&str>, BindError> {
        match self.values.get(name) {
            Some(Value::String(value)) => Ok(Some(value.as_str())),
            Some(Value::None) => Ok(None),
            _ => Err(Self::unbound(name, ArgumentKind::String)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, BindError> {
        self.optional_int(name)?
            .ok_or_else(|| Self::unbound(name, ArgumentKind::Int))
    }

    pub fn optional_int(&self, name: &str) -> Result<Option<i64>, BindError> {
        match self.values.get(name) {
            Some(Value::Int(value)) => Ok(Some(*value)),
            Some(Value::None) => Ok(None),
            _ => Err(Self::unbound(name, ArgumentKind::Int)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, BindError> {
        match self.values.get(name) {
            Some(Value::Float(value)) => Ok(*value),
            _ => Err(Self::unbound(name, ArgumentKind::Float)),
        }
    }

    /// Bareword value of a plain flag or choice parameter.
    pub fn flag(&self, name: &str) -> Result<&str, BindError> {
        match self.values.get(name) {
            Some(Value::Flag(value)) => Ok(value.as_str()),
            _ => Err(Self::unbound(name, ArgumentKind::Flag)),
        }
    }

    pub fn optional_string_array(&self, name: &str) -> Result<Option<&[String]>, BindError> {
        match self.values.get(name) {
            Some(Value::StringArray(items)) => Ok(Some(items.as_slice())),
            Some(Value::None) => Ok(None),
            _ => Err(Self::unbound(name, ArgumentKind::StringArray)),
        }
    }
}
