// ABOUTME: Typed entity tags (machine, model, controller, user) in <kind>-<id> form
// ABOUTME: Parses and validates machine tags handed in on the command line

use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

const MACHINE_KIND: &str = "machine";
const MODEL_KIND: &str = "model";
const CONTROLLER_KIND: &str = "controller";
const USER_KIND: &str = "user";

/// Tag kinds the control-plane knows about. Used only to pick the right
/// error message for a tag that is well-formed but of the wrong kind.
const KNOWN_KINDS: &[&str] = &[
    MACHINE_KIND,
    MODEL_KIND,
    CONTROLLER_KIND,
    USER_KIND,
    "unit",
    "application",
    "relation",
    "cloud",
];

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TagError {
    #[error("{0:?} is not a valid tag")]
    InvalidTag(String),
    #[error("{0:?} is not a valid machine tag")]
    InvalidMachineTag(String),
}

fn machine_id_regex() -> &'static Regex {
    static MACHINE_ID: OnceLock<Regex> = OnceLock::new();
    MACHINE_ID.get_or_init(|| {
        Regex::new(r"^(?:0|[1-9][0-9]*)(?:/[a-z]+/(?:0|[1-9][0-9]*))*$")
            .expect("machine id pattern is valid")
    })
}

/// Identifies a machine (or a container on a machine) to the control-plane.
///
/// The id uses `/` between container segments (`0/lxd/1`); the tag form
/// replaces them with `-` (`machine-0-lxd-1`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineTag {
    id: String,
}

impl MachineTag {
    /// Create a tag from a machine id such as `3` or `0/lxd/1`.
    pub fn new(id: &str) -> Result<Self, TagError> {
        if !machine_id_regex().is_match(id) {
            return Err(TagError::InvalidMachineTag(format!(
                "{}-{}",
                MACHINE_KIND,
                id.replace('/', "-")
            )));
        }
        Ok(Self { id: id.to_string() })
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl FromStr for MachineTag {
    type Err = TagError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let Some((kind, suffix)) = tag.split_once('-') else {
            return Err(TagError::InvalidTag(tag.to_string()));
        };
        if kind != MACHINE_KIND {
            if KNOWN_KINDS.contains(&kind) {
                return Err(TagError::InvalidMachineTag(tag.to_string()));
            }
            return Err(TagError::InvalidTag(tag.to_string()));
        }

        Self::new(&suffix.replace('-', "/"))
            .map_err(|_| TagError::InvalidMachineTag(tag.to_string()))
    }
}

impl fmt::Display for MachineTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", MACHINE_KIND, self.id.replace('/', "-"))
    }
}

/// Model ids are passed through as stored; the control-plane owns their format.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelTag(String);

impl ModelTag {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModelTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", MODEL_KIND, self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ControllerTag(String);

impl ControllerTag {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for ControllerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", CONTROLLER_KIND, self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserTag(String);

impl UserTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for UserTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", USER_KIND, self.0)
    }
}

/// The entity a connection logs in as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthTag {
    Machine(MachineTag),
    User(UserTag),
}

impl fmt::Display for AuthTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthTag::Machine(tag) => tag.fmt(f),
            AuthTag::User(tag) => tag.fmt(f),
        }
    }
}
