use std::fmt::{self, Display};

use serde_json::Value;

/// A model answer prepared for display.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// The answer parsed as JSON.
    Structured(Value),
    /// Anything else, shown as is.
    Raw(String),
}

impl Reply {
    /// Classifies the answer text.
    pub fn parse(text: &str) -> Self {
        match serde_json::from_str(text) {
            Ok(value) => Reply::Structured(value),
            Err(_) => Reply::Raw(text.to_owned()),
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Structured(value) => {
                let pretty =
                    serde_json::to_string_pretty(value).map_err(|_| fmt::Error)?;
                f.write_str(&pretty)
            }
            Reply::Raw(text) => f.write_str(text),
        }
    }
}
