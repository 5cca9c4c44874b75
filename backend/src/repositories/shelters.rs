//! Read-only access to the shelter reference dataset (the objective resolver).

use sqlx::PgExecutor;

use crate::models::ShelterRef;

/// Resolves a public shelter code to its internal id and display fields.
/// Codes are matched case-insensitively on the trimmed input.
pub async fn resolve_by_code(
    executor: impl PgExecutor<'_>,
    code: &str,
) -> Result<Option<ShelterRef>, sqlx::Error> {
    sqlx::query_as::<_, ShelterRef>(
        r#"
        SELECT id, public_code, name
        FROM shelters
        WHERE UPPER(public_code) = UPPER($1)
        "#,
    )
    .bind(code.trim())
    .fetch_optional(executor)
    .await
}
