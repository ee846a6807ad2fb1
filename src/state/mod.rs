//! Form session state

mod forms;
mod navigation;

pub use forms::*;
pub use navigation::*;
