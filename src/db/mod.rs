mod cache;
mod schema;

pub use cache::ArticleCache;
