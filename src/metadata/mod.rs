// Metadata module
pub mod tags;

pub use tags::TrackTags;
