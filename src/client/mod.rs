pub mod events;
pub mod session;
pub mod timestep;

pub use events::{CanvasEvent, EventCollector, EventHandler};
pub use session::Session;
pub use timestep::{lerp, Timestep};
