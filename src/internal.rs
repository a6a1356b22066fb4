#[macro_use]
pub mod optim;

pub mod state;
