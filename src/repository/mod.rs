pub mod invitation_keys;
pub mod room_repository;

pub use invitation_keys::*;
pub use room_repository::*;
