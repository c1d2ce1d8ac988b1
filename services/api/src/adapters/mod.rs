pub mod agent;
pub mod change_feed;
pub mod db;
pub mod storage;

pub use agent::HttpAgentClient;
pub use change_feed::PgChangeFeed;
pub use db::DbAdapter;
pub use storage::LocalObjectStorage;
