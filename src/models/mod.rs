mod article;

pub use article::{ArticleRecord, ArticleUpdate, OgMetadata, ProcessedArticle, RecentArticle};
