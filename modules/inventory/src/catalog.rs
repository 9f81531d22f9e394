use sqlx::PgPool;

/// `product.created` (routing key `product.product.created`): create
/// the inventory row. Callers are expected to have already clamped
/// `available` via `event_router::clamp_stock_quantity` on the raw
/// `available`/`initialStock` field, so this function just persists it.
pub async fn handle_product_created(pool: &PgPool, product_id: &str, available: i32) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("INSERT INTO inventory (product_id, available, reserved) VALUES ($1, $2, 0) ON CONFLICT (product_id) DO NOTHING")
        .bind(product_id)
        .bind(available)
        .execute(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_audit (product_id, action, previous_value, new_value, delta, reason)
        VALUES ($1, 'CREATE', 0, $2, $2, 'PRODUCT_CREATED')
        "#,
    )
    .bind(product_id)
    .bind(available)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(product_id, available, "inventory row created");
    Ok(())
}

/// `product.deleted` (routing key `product.product.deleted`): delete
/// the inventory row. Idempotent — deleting an already-absent row is a
/// no-op, not an error.
pub async fn handle_product_deleted(pool: &PgPool, product_id: &str) -> anyhow::Result<()> {
    let mut tx = pool.begin().await?;

    let row: Option<(i32,)> = sqlx::query_as("SELECT available FROM inventory WHERE product_id = $1").bind(product_id).fetch_optional(&mut *tx).await?;

    let Some((available,)) = row else {
        tx.rollback().await?;
        return Ok(());
    };

    sqlx::query("DELETE FROM inventory WHERE product_id = $1").bind(product_id).execute(&mut *tx).await?;

    sqlx::query(
        r#"
        INSERT INTO inventory_audit (product_id, action, previous_value, new_value, delta, reason)
        VALUES ($1, 'DELETE', $2, 0, $3, 'PRODUCT_DELETED')
        "#,
    )
    .bind(product_id)
    .bind(available)
    .bind(-available)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    tracing::info!(product_id, "inventory row deleted");
    Ok(())
}

