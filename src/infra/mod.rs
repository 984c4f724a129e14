pub mod http_client;
pub mod who_feed;

pub use http_client::HttpFetcher;
pub use who_feed::WhoFeed;
