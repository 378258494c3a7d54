pub mod error;
pub mod ids;

pub mod dm;
pub mod games;
pub mod history;
pub mod hub;
pub mod moderation;
pub mod poll;
pub mod session;
pub mod typing;

pub use error::CoreError;
pub use hub::Hub;
