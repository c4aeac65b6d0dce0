//! Focus tracker: which request origin the operator's next free-text reply goes to.

/// Selection token that closes the current dialog instead of focusing an origin.
/// Request ids are expected never to equal it.
pub const CLOSE_TOKEN: &str = "none";

/// The single piece of relay state. Owned by the router loop; starts as [`FocusState::None`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FocusState {
    #[default]
    None,
    Focused(String),
}

impl FocusState {
    /// Origin id currently in focus.
    pub fn focused(&self) -> Option<&str> {
        match self {
            FocusState::None => None,
            FocusState::Focused(id) => Some(id.as_str()),
        }
    }

    /// Apply a selection token. [`CLOSE_TOKEN`] clears focus; any other token
    /// becomes the focus verbatim, whether or not it was ever notified.
    pub fn select(&mut self, token: &str) {
        *self = if token == CLOSE_TOKEN {
            FocusState::None
        } else {
            FocusState::Focused(token.to_string())
        };
    }
}
