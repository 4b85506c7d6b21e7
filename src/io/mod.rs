mod event;
mod export;

pub use event::*;
pub use export::*;
