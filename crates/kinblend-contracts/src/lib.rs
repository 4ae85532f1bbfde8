pub mod chat;
pub mod events;
pub mod image;
pub mod state;
pub mod view;
