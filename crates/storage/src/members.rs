use hackspace_core::{MemberId, MemberPaymentProfile};
use hackspace_import::StoreError;
use tracing::debug;

use crate::db::DbPool;

/// A `members` row as stored.
type MemberRow = (i64, String, Option<String>);

/// Blank names are rejected; a blank reference reads as no reference.
fn profile_from_row((id, name, reference): MemberRow) -> Result<MemberPaymentProfile, StoreError> {
    if name.trim().is_empty() {
        return Err(StoreError::InvalidData(format!("member {id} has no name")));
    }
    let reference = reference.filter(|r| !r.trim().is_empty());
    Ok(MemberPaymentProfile::new(
        MemberId(id),
        &name,
        reference.as_deref(),
    ))
}

pub async fn add_member(
    pool: &DbPool,
    name: &str,
    payment_reference: Option<&str>,
) -> Result<MemberId, StoreError> {
    let result = sqlx::query("INSERT INTO members (name, payment_reference) VALUES (?, ?)")
        .bind(name)
        .bind(payment_reference)
        .execute(pool)
        .await
        .map_err(StoreError::backend)?;
    let id = MemberId(result.last_insert_rowid());
    debug!(member = %id, name, "member added");
    Ok(id)
}

/// Members in id order, which is the order the matcher tries them.
pub async fn list_members(pool: &DbPool) -> Result<Vec<MemberPaymentProfile>, StoreError> {
    let rows = sqlx::query_as::<_, MemberRow>(
        "SELECT id, name, payment_reference FROM members ORDER BY id",
    )
    .fetch_all(pool)
    .await
    .map_err(StoreError::backend)?;

    rows.into_iter().map(profile_from_row).collect()
}

pub async fn get_member(
    pool: &DbPool,
    id: MemberId,
) -> Result<Option<MemberPaymentProfile>, StoreError> {
    let row = sqlx::query_as::<_, MemberRow>(
        "SELECT id, name, payment_reference FROM members WHERE id = ?",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await
    .map_err(StoreError::backend)?;

    row.map(profile_from_row).transpose()
}

pub async fn set_payment_reference(
    pool: &DbPool,
    id: MemberId,
    reference: &str,
) -> Result<(), StoreError> {
    let result = sqlx::query("UPDATE members SET payment_reference = ? WHERE id = ?")
        .bind(reference)
        .bind(id.0)
        .execute(pool)
        .await
        .map_err(StoreError::backend)?;
    if result.rows_affected() == 0 {
        return Err(StoreError::MemberNotFound(id));
    }
    debug!(member = %id, reference, "payment reference updated");
    Ok(())
}
