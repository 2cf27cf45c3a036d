// ABOUTME: Positional argument contract for the migrate command
// ABOUTME: Turns the five raw tokens into a model/controller pair and a machine identity

use crate::error::{ArgumentField, MigrateError};
use crate::names::MachineTag;

/// Credentials identifying the calling agent to the source controller.
#[derive(Clone, PartialEq, Eq)]
pub struct MachineIdentity {
    pub tag: MachineTag,
    pub password: String,
    pub nonce: String,
}

impl std::fmt::Debug for MachineIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineIdentity")
            .field("tag", &self.tag)
            .field("password", &"***")
            .field("nonce", &self.nonce)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateArgs {
    pub model: String,
    pub target_controller: String,
    pub identity: MachineIdentity,
}

impl MigrateArgs {
    /// Parse `<model> <target-controller> <machine-tag> <password> <nonce>`.
    ///
    /// A short list reports the first missing field; a long one is rejected
    /// before anything is parsed.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, MigrateError> {
        if let Some(missing) = ArgumentField::ORDER.get(args.len()) {
            return Err(MigrateError::MissingArgument(*missing));
        }
        if args.len() > ArgumentField::ORDER.len() {
            return Err(MigrateError::TooManyArguments);
        }

        // Only a test driver takes machine credentials on the command line;
        // a real external tool would read them from the agent config on a
        // controller host.
        let tag: MachineTag = args[2]
            .as_ref()
            .parse()
            .map_err(MigrateError::InvalidIdentity)?;

        Ok(Self {
            model: args[0].as_ref().to_string(),
            target_controller: args[1].as_ref().to_string(),
            identity: MachineIdentity {
                tag,
                password: args[3].as_ref().to_string(),
                nonce: args[4].as_ref().to_string(),
            },
        })
    }
}
