use anyhow::{Context, Result};
use bfs_sim_core::{
    CellKind, Driver, DriverStatus, Outcome, Position, SimulationConfig, Snapshot, Speed, TieBreak,
};
use clap::Parser;
use ratatui::{
    crossterm::{
        self,
        event::{self, Event, KeyCode, KeyEventKind},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    },
    prelude::*,
    widgets::*,
};
use std::{
    fs::File,
    io::{self, Stdout},
    path::PathBuf,
    sync::Mutex,
    time::Duration,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(version, about = "Animated multi-agent BFS with shared door keys", long_about = None)]
struct Args {
    /// Map file to load (defaults to the built-in 6x6 mission)
    #[arg(short, long, value_name = "MAP_FILE")]
    map: Option<PathBuf>,

    /// Delay between automatic steps in milliseconds (100-1000)
    #[arg(short, long, default_value_t = Speed::DEFAULT_MS)]
    speed: u64,

    /// Winner when several agents reach the goal in the same step
    #[arg(long, default_value = "frontier-order", value_parser = parse_tie_break)]
    tie_break: TieBreak,

    /// Run to completion without the terminal UI and print the outcome
    #[arg(long)]
    headless: bool,

    /// Write logs to this file (the terminal UI otherwise logs nowhere)
    #[arg(long, value_name = "LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn parse_tie_break(s: &str) -> Result<TieBreak, String> {
    s.parse()
}

/// Agent colours, assigned in configuration order.
const AGENT_COLORS: [Color; 6] = [
    Color::Red,
    Color::Cyan,
    Color::Magenta,
    Color::Yellow,
    Color::Blue,
    Color::LightGreen,
];

struct App {
    /// Drives the search and holds the live snapshot.
    driver: Driver,
    /// Agent names in configuration order, for stable colours and listing.
    roster: Vec<(String, bool)>,
    /// Flag to control the main loop.
    should_quit: bool,
}

impl App {
    fn new(config: SimulationConfig, speed: u64) -> Result<Self> {
        let roster = config
            .agents
            .iter()
            .map(|a| (a.name.clone(), a.has_key))
            .collect();
        let driver = Driver::new();
        driver.set_speed(speed);
        driver.configure(config).context("Invalid mission configuration")?;
        Ok(App {
            driver,
            roster,
            should_quit: false,
        })
    }

    fn toggle_running(&mut self) {
        if self.driver.is_running() {
            self.driver.pause();
        } else {
            self.driver.start();
        }
    }

    fn change_speed(&mut self, faster: bool) {
        let speed = self.driver.speed();
        let next = if faster { speed.faster() } else { speed.slower() };
        self.driver.set_speed(next.millis());
    }

    fn agent_color(&self, name: &str) -> Color {
        self.roster
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| AGENT_COLORS[i % AGENT_COLORS.len()])
            .unwrap_or(Color::White)
    }

    fn quit(&mut self) {
        self.should_quit = true;
    }
}

fn load_config(args: &Args) -> Result<SimulationConfig> {
    let config = match &args.map {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read map file {}", path.display()))?;
            SimulationConfig::from_map_str(&text)
                .with_context(|| format!("Failed to load map {}", path.display()))?
        }
        None => SimulationConfig::starter(),
    };
    Ok(config.with_tie_break(args.tie_break))
}

fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.verbose { "debug" } else { "info" }));

    if let Some(path) = &args.log_file {
        let file = File::create(path)
            .with_context(|| format!("Failed to create log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else if args.headless {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    let config = load_config(&args)?;
    let runtime = tokio::runtime::Runtime::new().context("Failed to start the async runtime")?;
    let _guard = runtime.enter();

    let mut app = App::new(config, args.speed)?;

    if args.headless {
        return run_headless(&runtime, &app);
    }

    let mut terminal = setup_terminal()?;
    let outcome = run_app(&mut terminal, &mut app);
    restore_terminal(&mut terminal)?;
    outcome
}

/// Runs the mission on the timer and prints how it ended.
fn run_headless(runtime: &tokio::runtime::Runtime, app: &App) -> Result<()> {
    info!(interval_ms = app.driver.speed().millis(), "running headless");
    let snapshot = runtime
        .block_on(app.driver.run_to_end())
        .context("Driver produced no snapshot")?;

    match (snapshot.outcome(), snapshot.result()) {
        (Outcome::Solved, Some(result)) => println!(
            "{} reached the goal in {} steps (doors unlocked: {})",
            result.agent_name,
            result.elapsed,
            snapshot.doors_unlocked()
        ),
        _ => println!(
            "No agent can reach the goal (gave up after {} steps)",
            snapshot.elapsed()
        ),
    }
    Ok(())
}

/// Configures the terminal for TUI interaction.
fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    let mut stdout = io::stdout();
    enable_raw_mode()?;
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    Terminal::new(backend).map_err(Into::into)
}

/// Restores the terminal to its original state.
fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

/// Runs the main loop of the TUI application.
///
/// Stepping happens on the driver's own timer; this loop only redraws and
/// forwards key presses.
fn run_app(terminal: &mut Terminal<CrosstermBackend<Stdout>>, app: &mut App) -> Result<()> {
    let frame_rate = Duration::from_millis(50);

    loop {
        let snapshot = app.driver.snapshot();
        terminal.draw(|f| ui(f, app, snapshot.as_deref()))?;

        if crossterm::event::poll(frame_rate)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => app.quit(),
                        KeyCode::Char(' ') => app.toggle_running(),
                        KeyCode::Char('n') => app.driver.step(),
                        KeyCode::Char('r') => app.driver.reset(),
                        KeyCode::Char('+') | KeyCode::Char('=') => app.change_speed(true),
                        KeyCode::Char('-') => app.change_speed(false),
                        _ => {}
                    }
                }
            }
        }

        if app.should_quit {
            break;
        }
    }
    Ok(())
}

/// Renders the user interface.
fn ui(frame: &mut Frame, app: &App, snapshot: Option<&Snapshot>) {
    let main_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(8),    // Grid
            Constraint::Length(7), // Agents and status
            Constraint::Length(2), // Help
        ])
        .split(frame.area());

    let bottom = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(main_layout[1]);

    match snapshot {
        Some(snapshot) => render_grid(frame, main_layout[0], app, snapshot),
        None => {
            let idle = Paragraph::new("Reset. Press Space to start or 'n' to set up a new run.")
                .alignment(Alignment::Center)
                .block(Block::default().title("Mission").borders(Borders::ALL));
            frame.render_widget(idle, main_layout[0]);
        }
    }
    render_agents(frame, bottom[0], app, snapshot);
    render_status(frame, bottom[1], app, snapshot);

    let help_text =
        Paragraph::new("Space start/pause  n step  r reset  +/- speed  q quit")
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::TOP));
    frame.render_widget(help_text, main_layout[2]);
}

/// Renders the grid with goal, doors, visited cells and agents.
fn render_grid(frame: &mut Frame, area: Rect, app: &App, snapshot: &Snapshot) {
    let grid = snapshot.grid();
    let mut lines: Vec<Line> = Vec::with_capacity(grid.rows());

    for row in 0..grid.rows() {
        let mut spans: Vec<Span> = Vec::with_capacity(grid.cols());
        for col in 0..grid.cols() {
            let pos = Position { row, col };
            let agent_here = snapshot
                .agent_positions()
                .iter()
                .find(|(_, p)| **p == pos)
                .map(|(name, _)| name);

            let span = match (grid[pos], agent_here) {
                (CellKind::Goal, _) => Span::styled(" G ", Style::default().fg(Color::Green).bold()),
                (_, Some(name)) => {
                    let initial: String = name.chars().take(1).collect();
                    Span::styled(
                        format!(" {initial} "),
                        Style::default().fg(Color::Black).bg(app.agent_color(name)).bold(),
                    )
                }
                (CellKind::Locked, None) => Span::styled(" # ", Style::default().fg(Color::Red)),
                (CellKind::Unlocked, None) => Span::styled(" + ", Style::default().fg(Color::Yellow)),
                (CellKind::Empty, None) if snapshot.visited_cells().contains(&pos) => {
                    Span::styled(" . ", Style::default().fg(Color::DarkGray))
                }
                (CellKind::Empty, None) => Span::raw("   "),
            };
            spans.push(span);
        }
        lines.push(Line::from(spans));
    }

    let map_paragraph = Paragraph::new(lines)
        .block(Block::default().title("Grid").borders(Borders::ALL))
        .alignment(Alignment::Center);
    frame.render_widget(map_paragraph, area);
}

/// Lists each agent with its key flag and last reached cell.
fn render_agents(frame: &mut Frame, area: Rect, app: &App, snapshot: Option<&Snapshot>) {
    let items: Vec<ListItem> = app
        .roster
        .iter()
        .map(|(name, has_key)| {
            let at = snapshot
                .and_then(|s| s.agent_position(name))
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".to_string());
            let key = if *has_key { " [key]" } else { "" };
            ListItem::from(Line::from(vec![
                Span::styled(
                    format!("{name}{key}"),
                    Style::default().fg(app.agent_color(name)).bold(),
                ),
                Span::raw(format!(" at {at}")),
            ]))
        })
        .collect();

    let list = List::new(items).block(Block::default().borders(Borders::ALL).title("Agents"));
    frame.render_widget(list, area);
}

/// Shows elapsed steps, frontier size, door state, speed and the outcome.
fn render_status(frame: &mut Frame, area: Rect, app: &App, snapshot: Option<&Snapshot>) {
    let speed = app.driver.speed();
    let status = match app.driver.status() {
        DriverStatus::Idle => "Idle",
        DriverStatus::Ready => "Ready",
        DriverStatus::Running => "Running",
        DriverStatus::Terminal => "Finished",
    };

    let mut lines = vec![Line::from(format!(
        "Status: {status}   Speed: {} ({} ms)",
        speed.label(),
        speed.millis()
    ))];

    if let Some(snapshot) = snapshot {
        lines.push(Line::from(format!(
            "Step: {}   Frontier: {}",
            snapshot.elapsed(),
            snapshot.frontier_size()
        )));
        lines.push(Line::from(if snapshot.doors_unlocked() {
            Span::styled("Doors: unlocked", Style::default().fg(Color::Yellow))
        } else {
            Span::styled("Doors: locked", Style::default().fg(Color::Red))
        }));
        let outcome = match (snapshot.outcome(), snapshot.result()) {
            (Outcome::Solved, Some(result)) => Span::styled(
                format!("{} reached the goal in {} steps", result.agent_name, result.elapsed),
                Style::default().fg(Color::Green).bold(),
            ),
            (Outcome::Exhausted, _) => Span::styled(
                "Goal unreachable",
                Style::default().fg(Color::Red).bold(),
            ),
            _ => Span::raw("Searching..."),
        };
        lines.push(Line::from(outcome));
    }

    let paragraph =
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Status"));
    frame.render_widget(paragraph, area);
}
