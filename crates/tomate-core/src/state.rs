use serde::{Deserialize, Serialize};

/// Lifecycle state shared by [`Timer`](crate::Timer) and [`Session`](crate::Session).
///
/// Both machines use the same vocabulary but keep separate state variables.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    #[default]
    Stopped,
    Started,
    Finished,
}

impl State {
    pub fn as_str(self) -> &'static str {
        match self {
            State::Stopped => "stopped",
            State::Started => "started",
            State::Finished => "finished",
        }
    }
}

impl std::fmt::Display for State {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
