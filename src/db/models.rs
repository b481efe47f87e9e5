use serde::{Deserialize, Serialize};

/// A feed entry that has been recorded. One row per entry hash.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub site_url: String,
    pub entry_id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    pub published_at: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category_id: Option<i64>,
    pub category_title: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Data for inserting a new post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub site_url: String,
    pub entry_id: i64,
    pub hash: String,
    pub title: String,
    pub url: String,
    /// RFC3339 timestamp.
    pub published_at: String,
    pub content: String,
    pub author: String,
    pub category_id: i64,
    pub category_title: String,
}
