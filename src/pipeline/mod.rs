// Processing stages applied to every flushed group

pub mod editor;
pub mod images;
pub mod post;

pub use editor::RegionEditor;
pub use images::ImagePipeline;
pub use post::PostPipeline;
