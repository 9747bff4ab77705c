use std::borrow::{Borrow, Cow};
use std::collections::BTreeMap;
use std::ops::Deref;

use serde::de::Error;
use serde::{Deserialize, Deserializer};

/// Name of command argument.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ArgName(String);

impl ArgName {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'a> Deserialize<'a> for ArgName {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'a>,
    {
        let val = Cow::<str>::deserialize(deserializer)?;

        if val == "help" {
            return Err(Error::custom("reserved name"));
        }

        if val.is_empty() || val.contains('\0') {
            return Err(Error::custom("invalid argument name"));
        }

        Ok(Self(val.into_owned()))
    }
}

impl Deref for ArgName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ArgName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ArgName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Command argument definition.
#[derive(Debug, Deserialize)]
pub struct CommandArg {
    pub description: String,
    pub long: Option<String>,
    pub short: Option<char>,
    #[serde(rename = "type")]
    pub ty: ArgType,
    pub placeholder: Option<String>,
    pub default: Option<String>,
}

/// Type of command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArgType {
    Bool,
    String,
}

/// Value of a command argument as seen by the script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgValue {
    Bool(bool),
    String(Option<String>),
}

/// Parsed arguments of the invoked command, exposed to the script as the `args` global.
pub type ArgValues = BTreeMap<String, ArgValue>;
