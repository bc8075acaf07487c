use std::fmt;

#[derive(Debug, Clone, PartialEq)]
/// A typed argument produced by the command parser.
pub enum Argument {
    Flag(String),
    String(String),
    Int(i64),
    Float(f64),
    StringArray(Vec<String>),
}

impl Argument {
    pub fn kind(&self) -> ArgumentKind {
        match self {
            Self::Flag(_) => ArgumentKind::Flag,
            Self::String(_) => ArgumentKind::String,
            Self::Int(_) => ArgumentKind::Int,
            Self::Float(_) => ArgumentKind::Float,
            Self::StringArray(_) => ArgumentKind::StringArray,
        }
    }

    pub fn as_flag(&self) -> Option<&str> {
        match self {
            Self::Flag(name) => Some(name.as_str()),
            _ => None,
        }
    }

    /// Renders the argument roughly the way a user would have typed it.
    pub fn display_text(&self) -> String {
        match self {
            Self::Flag(name) => name.clone(),
            Self::String(value) => format!("\"{value}\""),
            Self::Int(value) => value.to_string(),
            Self::Float(value) => value.to_string(),
            Self::StringArray(items) => format!("[{}]", items.join(",")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Enumerates supported `ArgumentKind` values.
pub enum ArgumentKind {
    Flag,
    String,
    Int,
    Float,
    StringArray,
}

impl ArgumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "FLAG",
            Self::String => "STRING",
            Self::Int => "INT",
            Self::Float => "FLOAT",
            Self::StringArray => "STRARRAY",
        }
    }
}

impl fmt::Display for ArgumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
/// A bound parameter value handed to an operation body.
///
/// `None` is the absent value used as the default of optional parameters.
pub enum Value {
    None,
    Flag(String),
    String(String),
    Int(i64),
    Float(f64),
    StringArray(Vec<String>),
}

impl Value {
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Argument> for Value {
    fn from(argument: Argument) -> Self {
        match argument {
            Argument::Flag(name) => Self::Flag(name),
            Argument::String(value) => Self::String(value),
            Argument::Int(value) => Self::Int(value),
            Argument::Float(value) => Self::Float(value),
            Argument::StringArray(items) => Self::StringArray(items),
        }
    }
}
