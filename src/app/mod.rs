pub mod message;
pub mod presenter;
pub mod router;
pub mod stdio;
pub mod view;
