use serde::Serialize;

use crate::dto::outbound::{JoinGamePayload, OutboundCommand, RoomPayload};

/// Local player identity; the id is bound once the server acknowledges the join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerIdentity {
    /// Name chosen at join.
    pub name: String,
    /// Server-assigned id.
    pub id: Option<String>,
}

/// Which client this engine drives. Only gates commands and exposed controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    /// Game controller.
    Host,
    /// Competing player.
    Player(PlayerIdentity),
    /// Spectator screen.
    Display,
}

impl Role {
    /// Player role with a name and no id yet.
    pub fn player(name: impl Into<String>) -> Self {
        Role::Player(PlayerIdentity {
            name: name.into(),
            id: None,
        })
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::Player(_) => "player",
            Role::Display => "display",
        }
    }

    /// Own player id, once bound.
    pub fn player_id(&self) -> Option<&str> {
        match self {
            Role::Player(identity) => identity.id.as_deref(),
            _ => None,
        }
    }

    /// Own player name.
    pub fn player_name(&self) -> Option<&str> {
        match self {
            Role::Player(identity) => Some(identity.name.as_str()),
            _ => None,
        }
    }

    /// Bind the id returned by the join acknowledgment.
    pub fn bind_player_id(&mut self, id: String) {
        if let Role::Player(identity) = self {
            identity.id = Some(id);
        }
    }

    /// Whether `id` or `name` designate this client's player.
    pub fn is_me(&self, id: Option<&str>, name: Option<&str>) -> bool {
        let Role::Player(identity) = self else {
            return false;
        };
        match (identity.id.as_deref(), id) {
            (Some(own), Some(other)) => own == other,
            _ => name.is_some_and(|name| name == identity.name),
        }
    }

    /// Command announcing this client to `room_code`.
    pub fn join_command(&self, room_code: &str) -> OutboundCommand {
        let room_code = room_code.to_string();
        match self {
            Role::Host => OutboundCommand::JoinAsHost(RoomPayload { room_code }),
            Role::Display => OutboundCommand::JoinAsDisplay(RoomPayload { room_code }),
            Role::Player(identity) => OutboundCommand::JoinGame(JoinGamePayload {
                room_code,
                player_name: identity.name.clone(),
            }),
        }
    }

    /// Whether this role exposes `command`.
    pub fn permits(&self, command: &OutboundCommand) -> bool {
        use OutboundCommand as C;

        match (self, command) {
            (Role::Display, C::JoinAsDisplay(_) | C::LeaveGame(_)) => true,
            (Role::Display, _) => false,
            (
                Role::Player(_),
                C::JoinGame(_)
                | C::LeaveGame(_)
                | C::Buzz(_)
                | C::SubmitQcmAnswer(_)
                | C::PassBomb(_)
                | C::SelectTarget(_)
                | C::CreateTeam(_)
                | C::JoinTeam(_)
                | C::LeaveTeam(_),
            ) => true,
            (Role::Player(_), _) => false,
            (
                Role::Host,
                C::JoinGame(_)
                | C::JoinAsDisplay(_)
                | C::Buzz(_)
                | C::SubmitQcmAnswer(_)
                | C::PassBomb(_)
                | C::SelectTarget(_)
                | C::JoinTeam(_)
                | C::LeaveTeam(_),
            ) => false,
            (Role::Host, _) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::dto::outbound::{BuzzPayload, ValidateAnswerPayload};

    fn room() -> RoomPayload {
        RoomPayload {
            room_code: "AB12".into(),
        }
    }

    fn buzz() -> OutboundCommand {
        OutboundCommand::Buzz(BuzzPayload {
            room_code: "AB12".into(),
            request_id: Uuid::nil(),
        })
    }

    fn validate() -> OutboundCommand {
        OutboundCommand::ValidateAnswer(ValidateAnswerPayload {
            room_code: "AB12".into(),
            player_id: "p1".into(),
            is_correct: true,
        })
    }

    #[test]
    fn command_subsets_follow_role() {
        let player = Role::player("Alice");
        assert!(player.permits(&buzz()));
        assert!(!player.permits(&validate()));
        assert!(!player.permits(&OutboundCommand::StartRound(room())));

        assert!(Role::Host.permits(&validate()));
        assert!(Role::Host.permits(&OutboundCommand::ResumeAudio(room())));
        assert!(!Role::Host.permits(&buzz()));

        assert!(Role::Display.permits(&OutboundCommand::JoinAsDisplay(room())));
        assert!(!Role::Display.permits(&buzz()));
        assert!(!Role::Display.permits(&validate()));
    }

    #[test]
    fn identity_matches_by_id_once_bound() {
        let mut role = Role::player("Alice");
        assert!(role.is_me(Some("p9"), Some("Alice")));

        role.bind_player_id("p1".into());
        assert!(role.is_me(Some("p1"), None));
        assert!(!role.is_me(Some("p9"), Some("Alice")));
        assert!(role.is_me(None, Some("Alice")));
    }
}
