pub mod color;
pub mod frame;
pub mod geometry;
pub mod params;
pub mod pipeline;
pub mod scheduler;
pub mod shapes;
pub mod transform;
pub mod video;
