use anyhow::{Context, Result};
use sqlx::SqlitePool;

use super::models::{NewPost, Post};

// ========== Posts ==========

/// Check whether a post with this entry hash has already been recorded.
pub async fn post_exists_by_hash(pool: &SqlitePool, hash: &str) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM posts WHERE hash = ?)")
        .bind(hash)
        .fetch_one(pool)
        .await
        .context("Failed to check post existence")?;

    Ok(exists)
}

/// Get a post by its entry hash.
pub async fn get_post_by_hash(pool: &SqlitePool, hash: &str) -> Result<Option<Post>> {
    sqlx::query_as("SELECT * FROM posts WHERE hash = ?")
        .bind(hash)
        .fetch_optional(pool)
        .await
        .context("Failed to fetch post by hash")
}

/// Insert a post unless its hash is already present.
///
/// Returns the new row ID, or `None` when another insert for the same hash
/// got there first. The check and the insert are one statement.
pub async fn insert_post_if_absent(pool: &SqlitePool, post: &NewPost) -> Result<Option<i64>> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (site_url, entry_id, hash, title, url, published_at, content, author,
                           category_id, category_title)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(hash) DO NOTHING
        ",
    )
    .bind(&post.site_url)
    .bind(post.entry_id)
    .bind(&post.hash)
    .bind(&post.title)
    .bind(&post.url)
    .bind(&post.published_at)
    .bind(&post.content)
    .bind(&post.author)
    .bind(post.category_id)
    .bind(&post.category_title)
    .execute(pool)
    .await
    .context("Failed to insert post")?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Count all recorded posts.
pub async fn count_posts(pool: &SqlitePool) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
        .fetch_one(pool)
        .await
        .context("Failed to count posts")?;
    Ok(count)
}
