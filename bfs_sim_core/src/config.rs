use std::collections::HashSet;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::Position;

/// Largest accepted grid side.
pub const MAX_DIMENSION: usize = 20;

/// Errors raised while building or validating a [`SimulationConfig`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Grid dimensions must be positive, got {rows}x{cols}")]
    ZeroDimension { rows: usize, cols: usize },
    #[error("Grid dimensions {rows}x{cols} exceed the {max}x{max} limit")]
    TooLarge { rows: usize, cols: usize, max: usize },
    #[error("At least one agent is required")]
    NoAgents,
    #[error("Agent names must not be empty")]
    EmptyAgentName,
    #[error("Agent name '{0}' is used more than once")]
    DuplicateAgentName(String),
    #[error("{what} at {position} is outside the {rows}x{cols} grid")]
    OutOfBounds {
        what: String,
        position: Position,
        rows: usize,
        cols: usize,
    },
    #[error("Map line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// How the winner is picked when several agents reach the goal in the same
/// level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TieBreak {
    /// The first goal item in frontier order wins.
    #[default]
    FrontierOrder,
    /// The lexicographically smallest name among the agents that reached the
    /// goal on the same level wins.
    Lexicographic,
}

impl FromStr for TieBreak {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "frontier-order" | "frontier" => Ok(TieBreak::FrontierOrder),
            "lexicographic" | "name" => Ok(TieBreak::Lexicographic),
            other => Err(format!(
                "unknown tie-break '{other}' (expected frontier-order or lexicographic)"
            )),
        }
    }
}

/// A searching agent as configured before the run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentSpec {
    pub name: String,
    pub position: Position,
    pub has_key: bool,
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, position: Position, has_key: bool) -> Self {
        AgentSpec {
            name: name.into(),
            position,
            has_key,
        }
    }
}

/// Everything the initializer needs to build the first snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub rows: usize,
    pub cols: usize,
    pub agents: Vec<AgentSpec>,
    pub goal: Position,
    pub locked_doors: Vec<Position>,
    #[serde(default)]
    pub tie_break: TieBreak,
}

impl SimulationConfig {
    pub fn new(rows: usize, cols: usize, goal: Position) -> Self {
        SimulationConfig {
            rows,
            cols,
            agents: Vec::new(),
            goal,
            locked_doors: Vec::new(),
            tie_break: TieBreak::default(),
        }
    }

    pub fn with_agent(mut self, agent: AgentSpec) -> Self {
        self.agents.push(agent);
        self
    }

    pub fn with_door(mut self, door: Position) -> Self {
        self.locked_doors.push(door);
        self
    }

    pub fn with_tie_break(mut self, tie_break: TieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// The 6x6 starter mission: Jake at the top-left corner carrying the key,
    /// the goal in the opposite corner and one locked door in between.
    pub fn starter() -> Self {
        SimulationConfig::new(6, 6, Position::new(5, 5))
            .with_agent(AgentSpec::new("Jake", Position::new(0, 0), true))
            .with_door(Position::new(2, 2))
    }

    fn in_bounds(&self, pos: Position) -> bool {
        pos.row < self.rows && pos.col < self.cols
    }

    fn check_bounds(&self, what: impl Into<String>, position: Position) -> Result<(), ConfigError> {
        if self.in_bounds(position) {
            Ok(())
        } else {
            Err(ConfigError::OutOfBounds {
                what: what.into(),
                position,
                rows: self.rows,
                cols: self.cols,
            })
        }
    }

    /// Rejects malformed configurations before they reach the initializer.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(ConfigError::ZeroDimension {
                rows: self.rows,
                cols: self.cols,
            });
        }
        if self.rows > MAX_DIMENSION || self.cols > MAX_DIMENSION {
            return Err(ConfigError::TooLarge {
                rows: self.rows,
                cols: self.cols,
                max: MAX_DIMENSION,
            });
        }
        if self.agents.is_empty() {
            return Err(ConfigError::NoAgents);
        }

        let mut names = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(ConfigError::EmptyAgentName);
            }
            if !names.insert(agent.name.as_str()) {
                return Err(ConfigError::DuplicateAgentName(agent.name.clone()));
            }
            self.check_bounds(format!("Agent '{}'", agent.name), agent.position)?;
        }

        self.check_bounds("Goal", self.goal)?;
        for door in &self.locked_doors {
            self.check_bounds("Locked door", *door)?;
        }
        Ok(())
    }

    /// Parses a text map and validates the result.
    ///
    /// One line per row, whitespace-separated tokens:
    /// `..` empty, `DR` locked door, `GO` goal, `AG:<name>` agent,
    /// `AK:<name>` agent carrying a key. Blank lines and lines starting with
    /// `#` are skipped.
    pub fn from_map_str(map: &str) -> Result<Self, ConfigError> {
        let rows: Vec<(usize, Vec<&str>)> = map
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
            .map(|(n, line)| (n, line.split_whitespace().collect()))
            .collect();

        let Some((_, first)) = rows.first() else {
            return Err(ConfigError::Parse {
                line: 0,
                message: "map is empty".to_string(),
            });
        };
        let width = first.len();

        let mut agents = Vec::new();
        let mut doors = Vec::new();
        let mut goal: Option<Position> = None;

        for (row, (line, tokens)) in rows.iter().enumerate() {
            if tokens.len() != width {
                return Err(ConfigError::Parse {
                    line: *line,
                    message: format!("expected {} cells, found {}", width, tokens.len()),
                });
            }
            for (col, token) in tokens.iter().enumerate() {
                let pos = Position { row, col };
                match *token {
                    ".." => {}
                    "DR" => doors.push(pos),
                    "GO" => {
                        if goal.is_some() {
                            return Err(ConfigError::Parse {
                                line: *line,
                                message: "more than one goal ('GO')".to_string(),
                            });
                        }
                        goal = Some(pos);
                    }
                    agent if agent.starts_with("AG:") || agent.starts_with("AK:") => {
                        let (kind, name) = agent.split_at(3);
                        agents.push(AgentSpec::new(name, pos, kind == "AK:"));
                    }
                    unknown => {
                        return Err(ConfigError::Parse {
                            line: *line,
                            message: format!("unknown cell code '{unknown}' at column {col}"),
                        });
                    }
                }
            }
        }

        let goal = goal.ok_or_else(|| ConfigError::Parse {
            line: 0,
            message: "no goal ('GO') found".to_string(),
        })?;

        let config = SimulationConfig {
            rows: rows.len(),
            cols: width,
            agents,
            goal,
            locked_doors: doors,
            tie_break: TieBreak::default(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_is_valid() {
        assert_eq!(SimulationConfig::starter().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_dimensions() {
        let config = SimulationConfig::new(0, 4, Position::new(0, 0))
            .with_agent(AgentSpec::new("Jake", Position::new(0, 0), false));
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroDimension { rows: 0, cols: 4 })
        );
    }

    #[test]
    fn rejects_oversized_grid() {
        let config = SimulationConfig::new(21, 4, Position::new(0, 0))
            .with_agent(AgentSpec::new("Jake", Position::new(0, 0), false));
        assert!(matches!(config.validate(), Err(ConfigError::TooLarge { .. })));
    }

    #[test]
    fn rejects_missing_agents() {
        let config = SimulationConfig::new(3, 3, Position::new(2, 2));
        assert_eq!(config.validate(), Err(ConfigError::NoAgents));
    }

    #[test]
    fn rejects_duplicate_names() {
        let config = SimulationConfig::new(3, 3, Position::new(2, 2))
            .with_agent(AgentSpec::new("Amy", Position::new(0, 0), false))
            .with_agent(AgentSpec::new("Amy", Position::new(1, 0), true));
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateAgentName("Amy".to_string()))
        );
    }

    #[test]
    fn rejects_out_of_bounds_positions() {
        let agent_outside = SimulationConfig::new(3, 3, Position::new(2, 2))
            .with_agent(AgentSpec::new("Rosa", Position::new(3, 0), false));
        assert!(matches!(
            agent_outside.validate(),
            Err(ConfigError::OutOfBounds { position, .. }) if position == Position::new(3, 0)
        ));

        let goal_outside = SimulationConfig::new(3, 3, Position::new(0, 3))
            .with_agent(AgentSpec::new("Rosa", Position::new(0, 0), false));
        assert!(matches!(goal_outside.validate(), Err(ConfigError::OutOfBounds { .. })));

        let door_outside = SimulationConfig::new(3, 3, Position::new(2, 2))
            .with_agent(AgentSpec::new("Rosa", Position::new(0, 0), false))
            .with_door(Position::new(5, 5));
        assert!(matches!(door_outside.validate(), Err(ConfigError::OutOfBounds { .. })));
    }

    #[test]
    fn parses_map_text() {
        let map = "
            # two detectives
            AK:Amy  ..  ..
            ..      DR  ..
            AG:Jake ..  GO
        ";
        let config = SimulationConfig::from_map_str(map).expect("map parses");
        assert_eq!((config.rows, config.cols), (3, 3));
        assert_eq!(config.goal, Position::new(2, 2));
        assert_eq!(config.locked_doors, vec![Position::new(1, 1)]);
        assert_eq!(
            config.agents,
            vec![
                AgentSpec::new("Amy", Position::new(0, 0), true),
                AgentSpec::new("Jake", Position::new(2, 0), false),
            ]
        );
    }

    #[test]
    fn bundled_starter_map_matches_builtin() {
        let config = SimulationConfig::from_map_str(include_str!("../../maps/starter.txt"))
            .expect("starter map parses");
        assert_eq!(config, SimulationConfig::starter());
    }

    #[test]
    fn map_errors_name_the_line() {
        let ragged = "AG:Jake ..\n.. .. GO";
        assert!(matches!(
            SimulationConfig::from_map_str(ragged),
            Err(ConfigError::Parse { line: 2, .. })
        ));

        let unknown = "AG:Jake XX GO";
        assert!(matches!(
            SimulationConfig::from_map_str(unknown),
            Err(ConfigError::Parse { line: 1, .. })
        ));

        let no_goal = "AG:Jake ..";
        assert!(matches!(
            SimulationConfig::from_map_str(no_goal),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn tie_break_from_str() {
        assert_eq!("lexicographic".parse::<TieBreak>(), Ok(TieBreak::Lexicographic));
        assert_eq!("frontier-order".parse::<TieBreak>(), Ok(TieBreak::FrontierOrder));
        assert!("random".parse::<TieBreak>().is_err());
    }
}
