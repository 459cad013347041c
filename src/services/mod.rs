pub mod clock;
pub mod parser;
pub mod render;
