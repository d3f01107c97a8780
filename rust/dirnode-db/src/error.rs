use dirnode_core::Error as CoreError;

pub(crate) fn map_sqlx_error(context: &str, error: sqlx::Error) -> CoreError {
    match error {
        sqlx::Error::RowNotFound => CoreError::NotFound(context.to_string()),
        other => CoreError::Internal(anyhow::anyhow!("{context}: {other}")),
    }
}
