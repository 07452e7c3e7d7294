pub mod manager;
pub mod store;

pub use manager::FileSessionStore;
pub use store::{ChatBinding, SessionStore};
