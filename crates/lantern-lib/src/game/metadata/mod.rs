pub mod cache;
pub mod fetcher;
pub mod types;

pub use cache::*;
pub use fetcher::*;
pub use types::*;
