//! Configuration loading for the host.
//!
//! Leading configuration flags are handed to `ortho_config`; everything from
//! the first unrecognised token onwards is a document path.

use std::ffi::{OsStr, OsString};

use gdoc_config::Config;
use ortho_config::OrthoConfig;

use crate::AppError;

/// Flags accepted before the document list.
pub(crate) const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--log-filter",
    "--log-format",
    "--installation-root",
    "--server-log-level",
    "--server-log-filemode",
    "--server-log-scope",
    "--document-kinds",
    "--startup-timeout-ms",
    "--shutdown-grace-ms",
    "--channel-capacity",
    "--linger-ms",
];

/// Flags that never take a value.
pub(crate) const CONFIG_SWITCHES: &[&str] = &["--server-log-timestamp"];

pub(crate) trait ConfigLoader {
    /// Loads configuration from the program name plus leading config flags.
    fn load(&self, args: &[OsString]) -> Result<Config, AppError>;
}

pub(crate) struct OrthoConfigLoader;

impl ConfigLoader for OrthoConfigLoader {
    fn load(&self, args: &[OsString]) -> Result<Config, AppError> {
        Config::load_from_iter(args.iter().cloned()).map_err(AppError::LoadConfiguration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Stop,
}

fn classify(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Stop;
    }

    let (flag, inline_value) = match text.split_once('=') {
        Some((flag, _)) => (flag, true),
        None => (&*text, false),
    };

    if CONFIG_SWITCHES.contains(&flag) {
        FlagAction::Include { needs_value: false }
    } else if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !inline_value,
        }
    } else {
        FlagAction::Stop
    }
}

/// Arguments destined for the loader and the index of the first document.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ConfigArgumentSplit {
    pub(crate) config_arguments: Vec<OsString>,
    pub(crate) documents_start: usize,
}

pub(crate) fn split_config_arguments(args: &[OsString]) -> ConfigArgumentSplit {
    let mut config_arguments: Vec<OsString> = args.first().cloned().into_iter().collect();
    let mut documents_start = config_arguments.len();
    let mut awaiting_value = false;

    for argument in args.iter().skip(1) {
        if awaiting_value {
            awaiting_value = false;
        } else {
            match classify(argument) {
                FlagAction::Include { needs_value } => awaiting_value = needs_value,
                FlagAction::Stop => break,
            }
        }
        config_arguments.push(argument.clone());
        documents_start += 1;
    }

    ConfigArgumentSplit {
        config_arguments,
        documents_start,
    }
}
