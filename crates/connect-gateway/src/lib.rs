pub mod connection;
pub mod dispatcher;
pub mod feed;

pub use connection::handle_connection;
pub use dispatcher::Dispatcher;
pub use feed::{ChatCursor, ChatFeeds};
