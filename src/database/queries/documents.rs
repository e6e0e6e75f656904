use sqlx::PgPool;
use uuid::Uuid;

use crate::database::models::{CreateDocumentRequest, DocumentRow};

pub async fn create_document(
    pool: &PgPool,
    project_id: Uuid,
    request: &CreateDocumentRequest,
) -> Result<DocumentRow, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        r#"
        INSERT INTO public.documents (project_id, filename, content_type, source_url, raw_content, metadata)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(project_id)
    .bind(&request.filename)
    .bind(request.content_type.as_str())
    .bind(&request.source_url)
    .bind(&request.raw_content)
    .bind(&request.metadata)
    .fetch_one(pool)
    .await
}

pub async fn get_document(
    pool: &PgPool,
    document_id: Uuid,
    project_id: Uuid,
) -> Result<Option<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        "SELECT * FROM public.documents WHERE id = $1 AND project_id = $2",
    )
    .bind(document_id)
    .bind(project_id)
    .fetch_optional(pool)
    .await
}

pub async fn list_documents(
    pool: &PgPool,
    project_id: Uuid,
    content_type: Option<&str>,
    processed: Option<bool>,
    limit: i64,
    offset: i64,
) -> Result<Vec<DocumentRow>, sqlx::Error> {
    sqlx::query_as::<_, DocumentRow>(
        r#"
        SELECT * FROM public.documents
        WHERE project_id = $1
          AND ($2::text IS NULL OR content_type = $2)
          AND ($3::boolean IS NULL OR processed = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#,
    )
    .bind(project_id)
    .bind(content_type)
    .bind(processed)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

pub async fn count_documents(pool: &PgPool, project_id: Uuid) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM public.documents WHERE project_id = $1")
        .bind(project_id)
        .fetch_one(pool)
        .await
}

pub async fn delete_document(pool: &PgPool, document_id: Uuid) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM public.documents WHERE id = $1")
        .bind(document_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

pub async fn mark_processed(pool: &PgPool, document_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE public.documents
        SET processed = true, processed_at = NOW(), error_message = NULL
        WHERE id = $1
        "#,
    )
    .bind(document_id)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn record_error(
    pool: &PgPool,
    document_id: Uuid,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE public.documents
        SET processed = false, error_message = $1
        WHERE id = $2
        "#,
    )
    .bind(message)
    .bind(document_id)
    .execute(pool)
    .await?;
    Ok(())
}
