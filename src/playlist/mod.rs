pub mod discovery;
pub mod manager;
pub mod state;

pub use discovery::{discover, DirectoryProber, DiscoveryConfig, TrackProber};
pub use manager::{PlaylistEvent, PlaylistManager};
pub use state::{PlaylistSnapshot, PlaylistState, Track, DEFAULT_VOLUME};
