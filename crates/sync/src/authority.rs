use serde::{Deserialize, Serialize};

/// Which side of the connection currently owns write authority for a
/// binding. Exactly one side owns a binding at any instant; the other side
/// is receive-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuthoritySide {
    Server,
    Client,
}

impl AuthoritySide {
    pub fn opposite(self) -> Self {
        match self {
            AuthoritySide::Server => AuthoritySide::Client,
            AuthoritySide::Client => AuthoritySide::Server,
        }
    }
}
