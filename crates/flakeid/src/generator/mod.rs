mod mutex;
mod sequence;
mod state;
#[cfg(test)]
mod tests;

pub(crate) use mutex::*;
pub use sequence::*;
pub use state::*;
