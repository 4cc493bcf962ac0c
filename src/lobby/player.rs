use uuid::Uuid;

use crate::game::state::{PlayerEntry, Uid};

/// The player running this client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalPlayer {
    pub uid: Uid,
    pub name: String,
}

impl LocalPlayer {
    pub fn new(uid: impl Into<Uid>) -> Self {
        let uid = uid.into();
        let name = display_name(&uid);
        Self { uid, name }
    }

    /// Fresh identity, as handed out by anonymous sign-in
    pub fn anonymous() -> Self {
        Self::new(Uuid::new_v4().simple().to_string())
    }

    pub fn entry(&self) -> PlayerEntry {
        PlayerEntry::new(self.uid.clone(), self.name.clone())
    }
}

/// `Player-` followed by the first five characters of the uid
pub fn display_name(uid: &str) -> String {
    let prefix: String = uid.chars().take(5).collect();
    format!("Player-{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("a1b2c3d4"), "Player-a1b2c");
        assert_eq!(display_name("ab"), "Player-ab");
    }

    #[test]
    fn test_anonymous_players_differ() {
        let a = LocalPlayer::anonymous();
        let b = LocalPlayer::anonymous();
        assert_ne!(a.uid, b.uid);
        assert_eq!(a.name, display_name(&a.uid));
        assert_eq!(a.entry().uid, a.uid);
    }
}
