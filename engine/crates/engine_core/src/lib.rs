pub mod command;
pub mod events;
pub mod tick;

pub use command::{CommandStream, LastWriterWins, ResolvedCommands};
pub use events::EventBus;
pub use tick::{SimClock, Simulation, TickConfig, TickLoop};
