pub use self::{config::*, grid::*, record::*, saved::*};

pub(crate) mod config;
pub(crate) mod grid;
pub(crate) mod record;
pub(crate) mod saved;
