pub mod ellipse;
pub mod point;
