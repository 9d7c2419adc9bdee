use std::fmt;

/// User-facing banner raised when something did not go through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// A write was rejected; the view still shows the last confirmed state.
    WriteFailed {
        /// What the user tried, e.g. `add item`.
        action: &'static str,
        /// Error text from the store.
        message: String,
    },
    /// Sign-in was cancelled or refused.
    SignInFailed(String),
    /// The live query stopped; what is on screen may be out of date.
    StaleData,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::WriteFailed { action, message } => write!(f, "could not {action}: {message}"),
            Notice::SignInFailed(message) => write!(f, "sign-in failed: {message}"),
            Notice::StaleData => f.write_str("lost connection to the todo list; showing last known items"),
        }
    }
}
