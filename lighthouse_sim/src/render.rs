//! Text rendering of the grid.
//!
//! Renderers read a [`WorldState`] snapshot taken after a tick has completed,
//! never the live world, so drawing never contends for the world lock.

use lighthouse_env::{AgentId, Cell, WorldState};

use crate::runner::FrameSink;

/// Identity of an agent as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSummary {
    pub id: AgentId,
    pub name: String,
}

impl AgentSummary {
    /// Single-character marker: the uppercased first letter of the name.
    pub fn marker(&self) -> char {
        self.name
            .chars()
            .next()
            .map(|c| c.to_ascii_uppercase())
            .unwrap_or('?')
    }
}

/// Turns a world snapshot into a frame.
pub trait Renderer {
    fn render(&self, state: &WorldState, agents: &[AgentSummary]) -> String;
}

/// Draws the grid as rows of characters.
///
/// `.` empty, `O` obstacle, `G` goal, agents by their marker. An agent
/// standing on the goal hides the `G`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AsciiRenderer;

impl Renderer for AsciiRenderer {
    fn render(&self, state: &WorldState, agents: &[AgentSummary]) -> String {
        let layout = state.layout();
        let mut out = String::with_capacity(((layout.width() * 2 + 1) * layout.height()) as usize);

        for y in 0..layout.height() {
            let row: Vec<String> = (0..layout.width())
                .map(|x| {
                    let cell = Cell::new(x, y);
                    let occupant = agents
                        .iter()
                        .find(|agent| state.position(agent.id) == Some(cell));
                    match occupant {
                        Some(agent) => agent.marker(),
                        None if cell == layout.goal() => 'G',
                        None if layout.obstacles().contains(&cell) => 'O',
                        None => '.',
                    }
                    .to_string()
                })
                .collect();
            out.push_str(&row.join(" "));
            out.push('\n');
        }
        out
    }
}

/// Prints every tick to stdout.
pub struct ConsoleView<R: Renderer> {
    renderer: R,
    agents: Vec<AgentSummary>,
}

impl<R: Renderer> ConsoleView<R> {
    pub fn new(renderer: R, agents: Vec<AgentSummary>) -> Self {
        Self { renderer, agents }
    }
}

impl<R: Renderer> FrameSink for ConsoleView<R> {
    fn on_tick(&mut self, episode: usize, state: &WorldState) {
        println!("episode {} tick {}", episode + 1, state.tick());
        println!("{}", self.renderer.render(state, &self.agents));
    }
}
