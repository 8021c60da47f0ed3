//! Level-synchronous multi-source BFS.
//!
//! A [`Snapshot`] is the complete state of one search at one elapsed step.
//! [`Stepper::advance`] derives the next snapshot by expanding every frontier
//! item of the current level, for all agents at once, so the first agent to
//! stand on the goal is the one with the shortest path.
//!
//! Locked doors block key-less branches until any key-carrying branch walks
//! through one; from then on every door is open for everybody. The unlock
//! becomes visible to later items of the same level immediately and the grid
//! is rewritten at the end of that level.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    Direction, Position,
    config::{SimulationConfig, TieBreak},
    map::Grid,
};

/// Kind of a grid cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellKind {
    #[default]
    Empty,
    Locked,
    Unlocked,
    Goal,
}

/// One entry of the BFS queue, owned by a single agent's search tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrontierItem {
    pub position: Position,
    /// Whether this branch may pass locked doors.
    pub carries_key: bool,
    pub elapsed: usize,
    pub agent: String,
}

/// The winning arrival at the goal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationResult {
    pub agent_name: String,
    /// Path length of the winning branch. The step counter of the snapshot
    /// that records the result is one higher.
    pub elapsed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Searching,
    Solved,
    /// The goal cannot be reached by any agent.
    Exhausted,
}

/// Complete, immutable state of the search after `elapsed` steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    grid: Grid<CellKind>,
    goal: Position,
    tie_break: TieBreak,
    agent_positions: BTreeMap<String, Position>,
    elapsed: usize,
    frontier: Vec<FrontierItem>,
    result: Option<SimulationResult>,
    doors_unlocked: bool,
    visited_cells: BTreeSet<Position>,
    /// Agents whose expansion reached the goal on the last level, including
    /// arrivals dropped by the same-level dedupe.
    goal_arrivals: BTreeSet<String>,
    /// Every (cell, key) state reached since the last change of door state.
    #[serde(skip)]
    explored: Vec<bool>,
}

impl Snapshot {
    /// Builds the snapshot at elapsed step 0.
    ///
    /// Positions are not re-checked here; run [`SimulationConfig::validate`]
    /// first.
    pub fn initial(config: &SimulationConfig) -> Snapshot {
        let mut grid: Grid<CellKind> = Grid::new(config.rows, config.cols);
        for door in &config.locked_doors {
            if *door == config.goal {
                warn!(door = %door, "locked door placed on the goal; the goal takes precedence");
                continue;
            }
            grid[*door] = CellKind::Locked;
        }
        grid[config.goal] = CellKind::Goal;

        let mut explored = vec![false; grid.len() * 2];
        let mut agent_positions = BTreeMap::new();
        let mut visited_cells = BTreeSet::new();
        let mut goal_arrivals = BTreeSet::new();
        let mut frontier = Vec::with_capacity(config.agents.len());

        for agent in &config.agents {
            agent_positions.insert(agent.name.clone(), agent.position);
            visited_cells.insert(agent.position);
            if agent.position == config.goal {
                goal_arrivals.insert(agent.name.clone());
            }
            if let Some(slot) = state_index(&grid, agent.position, agent.has_key) {
                explored[slot] = true;
            }
            frontier.push(FrontierItem {
                position: agent.position,
                carries_key: agent.has_key,
                elapsed: 0,
                agent: agent.name.clone(),
            });
        }

        debug!(
            rows = config.rows,
            cols = config.cols,
            agents = config.agents.len(),
            doors = config.locked_doors.len(),
            "initialized search"
        );

        Snapshot {
            grid,
            goal: config.goal,
            tie_break: config.tie_break,
            agent_positions,
            elapsed: 0,
            frontier,
            result: None,
            doors_unlocked: false,
            visited_cells,
            goal_arrivals,
            explored,
        }
    }

    /// Advances one level with a throwaway [`Stepper`].
    pub fn step(&self) -> Snapshot {
        Stepper::new().advance(self)
    }

    pub fn grid(&self) -> &Grid<CellKind> {
        &self.grid
    }

    pub fn goal(&self) -> Position {
        self.goal
    }

    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Last cell each agent's search reached.
    pub fn agent_positions(&self) -> &BTreeMap<String, Position> {
        &self.agent_positions
    }

    pub fn agent_position(&self, name: &str) -> Option<Position> {
        self.agent_positions.get(name).copied()
    }

    pub fn elapsed(&self) -> usize {
        self.elapsed
    }

    pub fn frontier(&self) -> &[FrontierItem] {
        &self.frontier
    }

    pub fn frontier_size(&self) -> usize {
        self.frontier.len()
    }

    pub fn result(&self) -> Option<&SimulationResult> {
        self.result.as_ref()
    }

    pub fn doors_unlocked(&self) -> bool {
        self.doors_unlocked
    }

    /// Every cell any agent has reached so far. Display only.
    pub fn visited_cells(&self) -> &BTreeSet<Position> {
        &self.visited_cells
    }

    pub fn outcome(&self) -> Outcome {
        if self.result.is_some() {
            Outcome::Solved
        } else if self.frontier.is_empty() {
            Outcome::Exhausted
        } else {
            Outcome::Searching
        }
    }

    /// No further step can change this snapshot's outcome.
    pub fn is_terminal(&self) -> bool {
        self.outcome() != Outcome::Searching
    }

    fn winner(&self, first_at_goal: usize) -> SimulationResult {
        let first = &self.frontier[first_at_goal];
        // Every arrival of a level shares the same path length.
        let agent_name = match self.tie_break {
            TieBreak::FrontierOrder => &first.agent,
            TieBreak::Lexicographic => self.goal_arrivals.first().unwrap_or(&first.agent),
        };
        SimulationResult {
            agent_name: agent_name.clone(),
            elapsed: first.elapsed,
        }
    }
}

/// Slot of a (cell, key) state in a `rows * cols * 2` table.
fn state_index(grid: &Grid<CellKind>, pos: Position, key: bool) -> Option<usize> {
    grid.index_of(pos).map(|cell| cell * 2 + usize::from(key))
}

/// Per-level (cell, key) dedupe table.
///
/// Cleared between levels by bumping the generation instead of
/// reallocating; a slot is marked when it holds the current generation.
#[derive(Debug, Default)]
struct LevelVisited {
    stamps: Vec<u32>,
    generation: u32,
}

impl LevelVisited {
    fn begin_level(&mut self, slots: usize) {
        if self.stamps.len() != slots {
            self.stamps = vec![0; slots];
            self.generation = 0;
        }
        self.generation = self.generation.wrapping_add(1);
        if self.generation == 0 {
            self.stamps.fill(0);
            self.generation = 1;
        }
    }

    /// Marks a slot, returning `false` if it was already marked this level.
    fn insert(&mut self, slot: usize) -> bool {
        if self.stamps[slot] == self.generation {
            false
        } else {
            self.stamps[slot] = self.generation;
            true
        }
    }
}

/// Derives successive snapshots, reusing its scratch table between calls.
#[derive(Debug, Default)]
pub struct Stepper {
    visited: LevelVisited,
}

impl Stepper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Expands every item of the current level and returns the next snapshot.
    ///
    /// A snapshot that already holds a result is returned unchanged.
    pub fn advance(&mut self, current: &Snapshot) -> Snapshot {
        if current.result.is_some() {
            return current.clone();
        }

        let grid = &current.grid;
        self.visited.begin_level(grid.len() * 2);

        let mut frontier = Vec::with_capacity(current.frontier.len() * 2);
        let mut agent_positions = current.agent_positions.clone();
        let mut visited_cells = current.visited_cells.clone();
        let mut goal_arrivals = BTreeSet::new();
        let mut unlocked = current.doors_unlocked;
        let mut result = None;

        for (index, item) in current.frontier.iter().enumerate() {
            if item.position == current.goal {
                result = Some(current.winner(index));
                break;
            }

            for direction in Direction::ALL {
                let Some(next) = item.position.step(direction).filter(|p| grid.contains(*p))
                else {
                    continue;
                };
                let locked = grid[next] == CellKind::Locked;
                if locked && !item.carries_key && !unlocked {
                    continue;
                }

                let carries_key = item.carries_key || unlocked;
                let Some(slot) = state_index(grid, next, carries_key) else {
                    continue;
                };
                if next == current.goal && !goal_arrivals.contains(&item.agent) {
                    goal_arrivals.insert(item.agent.clone());
                }
                if !self.visited.insert(slot) {
                    continue;
                }

                frontier.push(FrontierItem {
                    position: next,
                    carries_key,
                    elapsed: current.elapsed + 1,
                    agent: item.agent.clone(),
                });
                if let Some(shown) = agent_positions.get_mut(&item.agent) {
                    *shown = next;
                }
                visited_cells.insert(next);

                if locked && carries_key && !unlocked {
                    debug!(agent = %item.agent, door = %next, "door opened with a key");
                    unlocked = true;
                }
            }
        }

        let newly_unlocked = unlocked && !current.doors_unlocked;
        let mut next_grid = current.grid.clone();
        if newly_unlocked {
            for cell in next_grid.iter_mut() {
                if *cell == CellKind::Locked {
                    *cell = CellKind::Unlocked;
                }
            }
            info!(elapsed = current.elapsed + 1, "all doors unlocked");
        }

        // Door state changed: reachability starts over.
        let mut explored = if newly_unlocked {
            vec![false; current.explored.len()]
        } else {
            current.explored.clone()
        };
        let mut discovered = 0usize;
        for item in &frontier {
            if let Some(slot) = state_index(grid, item.position, item.carries_key) {
                if !explored[slot] {
                    explored[slot] = true;
                    discovered += 1;
                }
            }
        }

        let elapsed = current.elapsed + 1;
        match &result {
            Some(found) => info!(
                agent = %found.agent_name,
                path_length = found.elapsed,
                elapsed,
                "goal reached"
            ),
            None if frontier.is_empty() => info!(elapsed, "frontier empty; goal unreachable"),
            None if discovered == 0 && !newly_unlocked => {
                info!(
                    elapsed,
                    revisits = frontier.len(),
                    "no new states reachable; goal unreachable"
                );
                frontier.clear();
            }
            None => debug!(elapsed, frontier = frontier.len(), discovered, "level expanded"),
        }

        Snapshot {
            grid: next_grid,
            goal: current.goal,
            tie_break: current.tie_break,
            agent_positions,
            elapsed,
            frontier,
            result,
            doors_unlocked: unlocked,
            visited_cells,
            goal_arrivals,
            explored,
        }
    }
}
