use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

use crate::state::model::{PlayerRecord, TeamRecord};

/// Server-declared point changes keyed by player id, applied atomically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScoreDelta(IndexMap<String, i64>);

impl ScoreDelta {
    /// Empty delta.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta for a single player.
    pub fn single(player_id: impl Into<String>, points: i64) -> Self {
        let mut delta = Self::new();
        delta.add(player_id, points);
        delta
    }

    /// Accumulate `points` for `player_id`.
    pub fn add(&mut self, player_id: impl Into<String>, points: i64) {
        *self.0.entry(player_id.into()).or_insert(0) += points;
    }

    /// Whether nothing changes.
    pub fn is_empty(&self) -> bool {
        self.0.values().all(|points| *points == 0)
    }

    /// Points for `player_id`, zero when absent.
    pub fn points_for(&self, player_id: &str) -> i64 {
        self.0.get(player_id).copied().unwrap_or(0)
    }

    /// Iterate over `(player_id, points)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.0.iter().map(|(id, points)| (id.as_str(), *points))
    }
}

impl FromIterator<(String, i64)> for ScoreDelta {
    fn from_iter<I: IntoIterator<Item = (String, i64)>>(iter: I) -> Self {
        let mut delta = Self::new();
        for (id, points) in iter {
            delta.add(id, points);
        }
        delta
    }
}

/// Incremental roster change or full list carried by a roster event.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterUpdate {
    /// A player joined; `full` is the server's complete list when sent.
    PlayerJoined {
        /// The new player.
        player: Option<PlayerRecord>,
        /// Complete list.
        full: Option<Vec<PlayerRecord>>,
    },
    /// A player left the game.
    PlayerLeft {
        /// Departed player.
        player_id: String,
        /// Complete list.
        full: Option<Vec<PlayerRecord>>,
    },
    /// A player's socket dropped; they stay listed as disconnected.
    PlayerDisconnected {
        /// Disconnected player.
        player_id: String,
        /// Complete list.
        full: Option<Vec<PlayerRecord>>,
    },
    /// A team was created, updated or deleted.
    TeamsChanged {
        /// Created or updated team.
        team: Option<TeamRecord>,
        /// Deleted team.
        deleted: Option<String>,
        /// Complete list.
        full: Option<Vec<TeamRecord>>,
    },
    /// A player joined or left a team.
    Membership {
        /// Moving player.
        player_id: String,
        /// New team, `None` when leaving.
        team_id: Option<String>,
        /// Complete team list.
        full: Option<Vec<TeamRecord>>,
    },
}

/// Player and team lists, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Roster {
    players: IndexMap<String, PlayerRecord>,
    teams: IndexMap<String, TeamRecord>,
}

impl Roster {
    /// Build from full lists.
    pub fn from_lists(players: Vec<PlayerRecord>, teams: Vec<TeamRecord>) -> Self {
        let mut roster = Self::default();
        roster.replace_players(players);
        roster.replace_teams(teams);
        roster
    }

    /// Players in server order.
    pub fn players(&self) -> impl Iterator<Item = &PlayerRecord> {
        self.players.values()
    }

    /// Teams in server order.
    pub fn teams(&self) -> impl Iterator<Item = &TeamRecord> {
        self.teams.values()
    }

    /// Lookup by id.
    pub fn player(&self, id: &str) -> Option<&PlayerRecord> {
        self.players.get(id)
    }

    /// Lookup by display name.
    pub fn player_by_name(&self, name: &str) -> Option<&PlayerRecord> {
        self.players.values().find(|player| player.name == name)
    }

    /// Players sorted by score, highest first; ties keep server order.
    pub fn leaderboard(&self) -> Vec<PlayerRecord> {
        let mut players: Vec<_> = self.players.values().cloned().collect();
        players.sort_by(|left, right| right.score.cmp(&left.score));
        players
    }

    /// Teams sorted by server aggregate score, highest first.
    pub fn team_leaderboard(&self) -> Vec<TeamRecord> {
        let mut teams: Vec<_> = self.teams.values().cloned().collect();
        teams.sort_by(|left, right| right.score.cmp(&left.score));
        teams
    }

    /// Replace the player list wholesale.
    pub fn replace_players(&mut self, players: Vec<PlayerRecord>) {
        self.players = players
            .into_iter()
            .map(|player| (player.id.clone(), player))
            .collect();
    }

    /// Replace the team list wholesale.
    pub fn replace_teams(&mut self, teams: Vec<TeamRecord>) {
        self.teams = teams
            .into_iter()
            .map(|team| (team.id.clone(), team))
            .collect();
    }

    /// Apply a diff, or a full list when the event carried one.
    pub fn apply(&mut self, update: RosterUpdate) {
        match update {
            RosterUpdate::PlayerJoined { full: Some(full), .. }
            | RosterUpdate::PlayerLeft { full: Some(full), .. }
            | RosterUpdate::PlayerDisconnected { full: Some(full), .. } => {
                self.replace_players(full);
            }
            RosterUpdate::PlayerJoined { player, full: None } => {
                if let Some(player) = player {
                    self.players.insert(player.id.clone(), player);
                }
            }
            RosterUpdate::PlayerLeft {
                player_id,
                full: None,
            } => {
                self.players.shift_remove(&player_id);
                for team in self.teams.values_mut() {
                    team.member_ids.retain(|member| *member != player_id);
                }
            }
            RosterUpdate::PlayerDisconnected {
                player_id,
                full: None,
            } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.connected = false;
                }
            }
            RosterUpdate::TeamsChanged { full: Some(full), .. } => self.replace_teams(full),
            RosterUpdate::TeamsChanged {
                team,
                deleted,
                full: None,
            } => {
                if let Some(team) = team {
                    self.teams.insert(team.id.clone(), team);
                }
                if let Some(deleted) = deleted {
                    self.teams.shift_remove(&deleted);
                    for player in self.players.values_mut() {
                        if player.team_id.as_deref() == Some(deleted.as_str()) {
                            player.team_id = None;
                        }
                    }
                }
            }
            RosterUpdate::Membership {
                player_id,
                team_id,
                full,
            } => {
                if let Some(player) = self.players.get_mut(&player_id) {
                    player.team_id = team_id.clone();
                }
                match full {
                    Some(full) => self.replace_teams(full),
                    None => {
                        for team in self.teams.values_mut() {
                            team.member_ids.retain(|member| *member != player_id);
                            if team_id.as_deref() == Some(team.id.as_str()) {
                                team.member_ids.push(player_id.clone());
                            }
                        }
                    }
                }
            }
        }
    }

    /// Shift player scores by `delta`. Team aggregates are left to the server.
    pub fn apply_delta(&mut self, delta: &ScoreDelta) {
        for (player_id, points) in delta.iter() {
            match self.players.get_mut(player_id) {
                Some(player) => {
                    player.score += points;
                    debug!(player_id, points, score = player.score, "score delta applied");
                }
                None => warn!(player_id, points, "score delta for unknown player"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: &str, score: i64) -> PlayerRecord {
        PlayerRecord {
            id: id.into(),
            name: id.to_uppercase(),
            score,
            color: None,
            buzzer_sound: None,
            connected: true,
            team_id: None,
        }
    }

    fn team(id: &str, score: i64, members: &[&str]) -> TeamRecord {
        TeamRecord {
            id: id.into(),
            name: id.into(),
            color: None,
            score,
            member_ids: members.iter().map(|member| member.to_string()).collect(),
        }
    }

    #[test]
    fn full_list_wins_over_diff() {
        let mut roster = Roster::from_lists(vec![player("a", 10)], vec![]);
        roster.apply(RosterUpdate::PlayerJoined {
            player: Some(player("b", 0)),
            full: Some(vec![player("a", 12), player("b", 0), player("c", 0)]),
        });

        let ids: Vec<_> = roster.players().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(roster.player("a").unwrap().score, 12);
    }

    #[test]
    fn diffs_apply_without_full_lists() {
        let mut roster = Roster::from_lists(
            vec![player("a", 0), player("b", 0)],
            vec![team("red", 0, &["a", "b"])],
        );
        roster.apply(RosterUpdate::PlayerDisconnected {
            player_id: "a".into(),
            full: None,
        });
        roster.apply(RosterUpdate::PlayerLeft {
            player_id: "b".into(),
            full: None,
        });

        assert!(!roster.player("a").unwrap().connected);
        assert!(roster.player("b").is_none());
        assert_eq!(roster.teams().next().unwrap().member_ids, vec!["a"]);
    }

    #[test]
    fn delta_never_touches_team_aggregates() {
        let mut roster = Roster::from_lists(
            vec![player("a", 10), player("b", 5)],
            vec![team("red", 40, &["a", "b"])],
        );
        let mut delta = ScoreDelta::new();
        delta.add("a", 15);
        delta.add("b", -5);
        delta.add("ghost", 3);
        roster.apply_delta(&delta);

        assert_eq!(roster.player("a").unwrap().score, 25);
        assert_eq!(roster.player("b").unwrap().score, 0);
        assert_eq!(roster.teams().next().unwrap().score, 40);
    }

    #[test]
    fn membership_moves_player_between_teams() {
        let mut roster = Roster::from_lists(
            vec![player("a", 0)],
            vec![team("red", 0, &["a"]), team("blue", 0, &[])],
        );
        roster.apply(RosterUpdate::Membership {
            player_id: "a".into(),
            team_id: Some("blue".into()),
            full: None,
        });

        assert_eq!(roster.player("a").unwrap().team_id.as_deref(), Some("blue"));
        let members: Vec<_> = roster.teams().map(|t| t.member_ids.len()).collect();
        assert_eq!(members, vec![0, 1]);
    }

    #[test]
    fn leaderboard_sorts_by_score() {
        let roster = Roster::from_lists(
            vec![player("a", 5), player("b", 20), player("c", 5)],
            vec![],
        );
        let order: Vec<_> = roster.leaderboard().into_iter().map(|p| p.id).collect();
        assert_eq!(order, vec!["b", "a", "c"]);
    }
}
