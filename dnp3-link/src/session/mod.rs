//! Link session: facade, state machines and timers

mod link_layer;
mod primary;
mod secondary;
mod timer;


pub use link_layer::LinkLayer;
