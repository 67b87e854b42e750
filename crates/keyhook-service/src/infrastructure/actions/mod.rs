//! Built-in actions.
//!
//! Each action is a plain struct of typed fields with an explicit field
//! table (see [`ActionType`](crate::application::action_registry::ActionType)).
//! `validate()` runs at configuration time; `execute()` re-checks the same
//! conditions and turns a bad configuration into a logged failure instead of
//! a side effect.
//!
//! | Type id        | Action                    |
//! |----------------|---------------------------|
//! | `run_app`      | [`RunApplicationAction`]  |
//! | `send_keys`    | [`SendKeystrokesAction`]  |
//! | `http_request` | [`HttpRequestAction`]     |
//! | `play_sound`   | [`PlaySoundAction`]       |

use std::path::Path;

use crate::application::action_registry::{ActionContext, ActionError, ActionRegistry};

pub mod http_request;
pub mod play_sound;
pub mod run_application;
pub mod send_keystrokes;

pub use http_request::HttpRequestAction;
pub use play_sound::PlaySoundAction;
pub use run_application::RunApplicationAction;
pub use send_keystrokes::SendKeystrokesAction;

impl ActionRegistry {
    /// Registry with the four built-in action types.
    pub fn with_builtin_actions(ctx: ActionContext) -> Self {
        let mut registry = ActionRegistry::new(ctx);
        registry.register::<RunApplicationAction>();
        registry.register::<SendKeystrokesAction>();
        registry.register::<HttpRequestAction>();
        registry.register::<PlaySoundAction>();
        registry
    }
}

/// Shared check for actions that point at a file.
pub(crate) fn validate_existing_file(file_path: &str) -> Result<(), ActionError> {
    if file_path.trim().is_empty() {
        return Err(ActionError::validation("File path is required"));
    }
    if !Path::new(file_path).is_file() {
        return Err(ActionError::validation(format!("File not found: {file_path}")));
    }
    Ok(())
}

/// Splits a command-line argument string on whitespace, keeping
/// double-quoted runs together and dropping the quotes.
pub(crate) fn split_arguments(arguments: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;

    for c in arguments.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    args.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        args.push(current);
    }
    args
}
