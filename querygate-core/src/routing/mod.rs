mod engine;
mod signals;
mod types;


pub use engine::*;
pub use signals::*;
pub use types::*;
