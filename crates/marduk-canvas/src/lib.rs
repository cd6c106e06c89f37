//! Marduk remote canvas crate.
//!
//! Records 2D canvas commands into a shared-memory transport, replays them on
//! a translator thread and hands finished surfaces to compositors through the
//! replay texture registry.

pub mod config;
pub mod coords;
pub mod error;
pub mod event;
pub mod ids;
pub mod logging;
pub mod manager;
pub mod paint;
pub mod recorder;
pub mod registry;
pub mod render_thread;
pub mod replay;
pub mod state;
pub mod transport;

mod sync;

pub use config::CanvasConfig;
pub use error::{ProtocolError, SnapshotError, TransportError};
pub use manager::{CanvasManager, ManagerEndpoint};
pub use recorder::Recorder;
pub use registry::ReplayTextureRegistry;
pub use replay::LocalTranslator;
pub use state::RemoteCanvasState;
