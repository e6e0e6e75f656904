use serde_json::Value;
use sqlx::PgPool;

use crate::database::models::ProjectRow;

pub async fn create_project(
    pool: &PgPool,
    name: &str,
    slug: &str,
    graph_name: &str,
    description: Option<&str>,
    settings: Option<&Value>,
) -> Result<ProjectRow, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        r#"
        INSERT INTO public.projects (name, slug, graph_name, description, settings)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING id, slug, name, graph_name, description, settings, created_at, updated_at
        "#,
    )
    .bind(name)
    .bind(slug)
    .bind(graph_name)
    .bind(description)
    .bind(settings)
    .fetch_one(pool)
    .await
}

pub async fn get_project_by_slug(
    pool: &PgPool,
    slug: &str,
) -> Result<Option<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, slug, name, graph_name, description, settings, created_at, updated_at
        FROM public.projects
        WHERE slug = $1
        "#,
    )
    .bind(slug)
    .fetch_optional(pool)
    .await
}

pub async fn list_projects(pool: &PgPool) -> Result<Vec<ProjectRow>, sqlx::Error> {
    sqlx::query_as::<_, ProjectRow>(
        r#"
        SELECT id, slug, name, graph_name, description, settings, created_at, updated_at
        FROM public.projects
        ORDER BY created_at ASC
        "#,
    )
    .fetch_all(pool)
    .await
}

pub async fn delete_project(pool: &PgPool, slug: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM public.projects WHERE slug = $1")
        .bind(slug)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
