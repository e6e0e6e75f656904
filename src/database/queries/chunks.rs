use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

pub struct NewChunk<'a> {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: &'a str,
    pub chunk_index: i32,
    pub token_count: i32,
    pub vector_point_id: Uuid,
    pub metadata: Value,
}

pub async fn insert_chunk(pool: &PgPool, chunk: &NewChunk<'_>) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO public.chunks (id, document_id, content, chunk_index, token_count, vector_point_id, metadata)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(chunk.id)
    .bind(chunk.document_id)
    .bind(chunk.content)
    .bind(chunk.chunk_index)
    .bind(chunk.token_count)
    .bind(chunk.vector_point_id)
    .bind(&chunk.metadata)
    .execute(pool)
    .await?;
    Ok(())
}

/// Vector point ids of all chunks belonging to a document.
pub async fn list_point_ids(pool: &PgPool, document_id: Uuid) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT vector_point_id FROM public.chunks
        WHERE document_id = $1 AND vector_point_id IS NOT NULL
        "#,
    )
    .bind(document_id)
    .fetch_all(pool)
    .await
}

pub async fn delete_for_document(pool: &PgPool, document_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM public.chunks WHERE document_id = $1")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn count_for_document(pool: &PgPool, document_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM public.chunks WHERE document_id = $1")
        .bind(document_id)
        .fetch_one(pool)
        .await
}
