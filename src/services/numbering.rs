use crate::{
    context::RequestContext,
    db::DbPool,
    entities::{allocated_number, sequence_setting},
    errors::{is_unique_violation, ServiceError},
    services::audit::{AuditEntry, AuditService},
};
use chrono::Utc;
use metrics::{counter, histogram};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// `branch_scope` value for sequences shared by every branch of a tenant.
pub const TENANT_WIDE_SCOPE: &str = "-";

const MAX_DOC_TYPE_LEN: usize = 40;

/// Identifies one independent sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceKey {
    pub tenant_id: Uuid,
    pub doc_type: String,
    pub branch_scope: String,
}

impl SequenceKey {
    pub fn new(
        tenant_id: Uuid,
        doc_type: &str,
        branch_id: Option<Uuid>,
    ) -> Result<Self, ServiceError> {
        Ok(Self {
            tenant_id,
            doc_type: normalize_doc_type(doc_type)?,
            branch_scope: branch_scope(branch_id),
        })
    }

    fn tenant_wide(&self) -> Self {
        Self {
            branch_scope: TENANT_WIDE_SCOPE.to_string(),
            ..self.clone()
        }
    }

    fn allocated_condition(&self) -> Condition {
        Condition::all()
            .add(allocated_number::Column::TenantId.eq(self.tenant_id))
            .add(allocated_number::Column::DocType.eq(self.doc_type.clone()))
            .add(allocated_number::Column::BranchScope.eq(self.branch_scope.clone()))
    }

    fn settings_condition(&self) -> Condition {
        Condition::all()
            .add(sequence_setting::Column::TenantId.eq(self.tenant_id))
            .add(sequence_setting::Column::DocType.eq(self.doc_type.clone()))
            .add(sequence_setting::Column::BranchScope.eq(self.branch_scope.clone()))
    }
}

pub fn branch_scope(branch_id: Option<Uuid>) -> String {
    branch_id
        .map(|id| id.to_string())
        .unwrap_or_else(|| TENANT_WIDE_SCOPE.to_string())
}

/// Upper-cases `raw` and checks it is a `[A-Z0-9_]` identifier of at most 40 chars.
pub fn normalize_doc_type(raw: &str) -> Result<String, ServiceError> {
    let doc_type = raw.trim().to_ascii_uppercase();
    let valid = !doc_type.is_empty()
        && doc_type.len() <= MAX_DOC_TYPE_LEN
        && doc_type
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_');
    if !valid {
        return Err(ServiceError::ValidationError(format!(
            "document type '{}' must be 1-{} characters of A-Z, 0-9 or _",
            raw, MAX_DOC_TYPE_LEN
        )));
    }
    Ok(doc_type)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    pub prefix: String,
    pub suffix: String,
    pub width: usize,
}

impl NumberFormat {
    /// Zero-pads to `width`; wider numbers are kept whole.
    pub fn render(&self, number: i64) -> String {
        format!(
            "{}{:0width$}{}",
            self.prefix,
            number,
            self.suffix,
            width = self.width
        )
    }
}

#[derive(Debug, Clone)]
struct EffectiveSettings {
    format: NumberFormat,
    start_after: i64,
}

/// A number claimed for one document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct Allocation {
    pub doc_type: String,
    pub branch_scope: String,
    pub number: i64,
    pub formatted: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NumberPreview {
    pub doc_type: String,
    pub branch_scope: String,
    pub next_number: i64,
    pub formatted: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct ConfigureSequence {
    /// Omit for the tenant-wide sequence
    pub branch_id: Option<Uuid>,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub prefix: String,
    #[serde(default)]
    #[validate(length(max = 10))]
    pub suffix: String,
    #[validate(range(min = 1, max = 20))]
    pub width: Option<u32>,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub start_after: i64,
}

/// Hands out `MAX + 1` per sequence, relying on the unique index over
/// allocated numbers to detect concurrent claims of the same value.
#[derive(Clone)]
pub struct NumberingService {
    db: Arc<DbPool>,
    audit: AuditService,
    max_attempts: u32,
    default_width: u32,
}

impl NumberingService {
    pub fn new(db: Arc<DbPool>, audit: AuditService, max_attempts: u32, default_width: u32) -> Self {
        Self {
            db,
            audit,
            max_attempts,
            default_width,
        }
    }

    /// Allocates the next number in its own transaction.
    #[instrument(skip(self, ctx), fields(tenant_id = %ctx.tenant_id))]
    pub async fn next(
        &self,
        ctx: &RequestContext,
        doc_type: &str,
        branch_id: Option<Uuid>,
    ) -> Result<Allocation, ServiceError> {
        let key = SequenceKey::new(ctx.tenant_id, doc_type, branch_id)?;
        let allocation = self.allocate(self.db.as_ref(), &key).await?;
        info!(
            doc_type = %allocation.doc_type,
            number = %allocation.formatted,
            "Number allocated"
        );
        Ok(allocation)
    }

    /// Allocates on `conn`. When `conn` is a transaction the claim is a
    /// savepoint of it, so rolling the caller back releases the number.
    pub async fn allocate<C>(&self, conn: &C, key: &SequenceKey) -> Result<Allocation, ServiceError>
    where
        C: ConnectionTrait + TransactionTrait,
    {
        let settings = self.effective_settings(conn, key).await?;

        for attempt in 1..=self.max_attempts {
            let candidate = current_max(conn, key).await?.max(settings.start_after) + 1;
            let formatted = settings.format.render(candidate);

            if try_claim(conn, key, candidate, &formatted).await? {
                histogram!("planac_numbering.attempts", attempt as f64);
                return Ok(Allocation {
                    doc_type: key.doc_type.clone(),
                    branch_scope: key.branch_scope.clone(),
                    number: candidate,
                    formatted,
                });
            }

            counter!("planac_numbering.retries", 1);
            debug!(attempt, candidate, doc_type = %key.doc_type, "Number already taken, retrying");
        }

        warn!(
            doc_type = %key.doc_type,
            branch_scope = %key.branch_scope,
            attempts = self.max_attempts,
            "Number allocation exhausted its attempts"
        );
        Err(ServiceError::Conflict(format!(
            "could not allocate a {} number after {} attempts",
            key.doc_type, self.max_attempts
        )))
    }

    /// The number `next` would return now, without claiming it.
    pub async fn preview(
        &self,
        ctx: &RequestContext,
        doc_type: &str,
        branch_id: Option<Uuid>,
    ) -> Result<NumberPreview, ServiceError> {
        let key = SequenceKey::new(ctx.tenant_id, doc_type, branch_id)?;
        let db = self.db.as_ref();
        let settings = self.effective_settings(db, &key).await?;
        let next_number = current_max(db, &key).await?.max(settings.start_after) + 1;

        Ok(NumberPreview {
            formatted: settings.format.render(next_number),
            doc_type: key.doc_type,
            branch_scope: key.branch_scope,
            next_number,
        })
    }

    #[instrument(skip(self, ctx, input), fields(tenant_id = %ctx.tenant_id))]
    pub async fn configure(
        &self,
        ctx: &RequestContext,
        doc_type: &str,
        input: ConfigureSequence,
    ) -> Result<sequence_setting::Model, ServiceError> {
        input.validate()?;
        let key = SequenceKey::new(ctx.tenant_id, doc_type, input.branch_id)?;
        let db = self.db.as_ref();
        let width = input.width.unwrap_or(self.default_width) as i32;
        let now = Utc::now();

        let existing = sequence_setting::Entity::find()
            .filter(key.settings_condition())
            .one(db)
            .await
            .map_err(ServiceError::db_error)?;

        let before = existing.clone();
        let saved = match existing {
            Some(current) => {
                let mut active: sequence_setting::ActiveModel = current.into();
                active.prefix = Set(input.prefix);
                active.suffix = Set(input.suffix);
                active.width = Set(width);
                active.start_after = Set(input.start_after);
                active.updated_at = Set(now);
                active.update(db).await.map_err(ServiceError::db_error)?
            }
            None => sequence_setting::ActiveModel {
                id: Set(Uuid::new_v4()),
                tenant_id: Set(key.tenant_id),
                doc_type: Set(key.doc_type.clone()),
                branch_scope: Set(key.branch_scope.clone()),
                prefix: Set(input.prefix),
                suffix: Set(input.suffix),
                width: Set(width),
                start_after: Set(input.start_after),
                created_at: Set(now),
                updated_at: Set(now),
            }
            .insert(db)
            .await
            .map_err(|e| {
                ServiceError::from_write(e, || {
                    format!("sequence {} was configured concurrently", key.doc_type)
                })
            })?,
        };

        info!(doc_type = %saved.doc_type, branch_scope = %saved.branch_scope, "Sequence configured");

        let mut entry = AuditEntry::new("CONFIGURE", "sequence_settings", Some(saved.id)).after(&saved);
        if let Some(before) = &before {
            entry = entry.before(before);
        }
        self.audit.record(ctx, entry).await;

        Ok(saved)
    }

    pub async fn list_settings(
        &self,
        ctx: &RequestContext,
    ) -> Result<Vec<sequence_setting::Model>, ServiceError> {
        sequence_setting::Entity::find()
            .filter(sequence_setting::Column::TenantId.eq(ctx.tenant_id))
            .order_by_asc(sequence_setting::Column::DocType)
            .order_by_asc(sequence_setting::Column::BranchScope)
            .all(self.db.as_ref())
            .await
            .map_err(ServiceError::db_error)
    }

    /// Branch settings win; otherwise the tenant-wide row; otherwise defaults.
    async fn effective_settings<C: ConnectionTrait>(
        &self,
        conn: &C,
        key: &SequenceKey,
    ) -> Result<EffectiveSettings, ServiceError> {
        let mut row = sequence_setting::Entity::find()
            .filter(key.settings_condition())
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?;

        if row.is_none() && key.branch_scope != TENANT_WIDE_SCOPE {
            row = sequence_setting::Entity::find()
                .filter(key.tenant_wide().settings_condition())
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?;
        }

        Ok(match row {
            Some(row) => EffectiveSettings {
                format: NumberFormat {
                    prefix: row.prefix,
                    suffix: row.suffix,
                    width: row.width.max(1) as usize,
                },
                start_after: row.start_after.max(0),
            },
            None => EffectiveSettings {
                format: NumberFormat {
                    prefix: String::new(),
                    suffix: String::new(),
                    width: self.default_width.max(1) as usize,
                },
                start_after: 0,
            },
        })
    }
}

async fn current_max<C: ConnectionTrait>(conn: &C, key: &SequenceKey) -> Result<i64, ServiceError> {
    let max: Option<Option<i64>> = allocated_number::Entity::find()
        .select_only()
        .column_as(allocated_number::Column::Number.max(), "max_number")
        .filter(key.allocated_condition())
        .into_tuple()
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(max.flatten().unwrap_or(0))
}

/// Inserts `number` for `key` inside a savepoint. `Ok(false)` means another
/// caller holds it already.
pub async fn try_claim<C>(
    conn: &C,
    key: &SequenceKey,
    number: i64,
    formatted: &str,
) -> Result<bool, ServiceError>
where
    C: ConnectionTrait + TransactionTrait,
{
    let savepoint = conn.begin().await.map_err(ServiceError::db_error)?;

    let row = allocated_number::ActiveModel {
        id: Set(Uuid::new_v4()),
        tenant_id: Set(key.tenant_id),
        doc_type: Set(key.doc_type.clone()),
        branch_scope: Set(key.branch_scope.clone()),
        number: Set(number),
        formatted: Set(formatted.to_string()),
        created_at: Set(Utc::now()),
    };

    match row.insert(&savepoint).await {
        Ok(_) => {
            savepoint.commit().await.map_err(ServiceError::db_error)?;
            Ok(true)
        }
        Err(err) if is_unique_violation(&err) => {
            savepoint.rollback().await.map_err(ServiceError::db_error)?;
            Ok(false)
        }
        Err(err) => Err(ServiceError::db_error(err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn format(prefix: &str, suffix: &str, width: usize) -> NumberFormat {
        NumberFormat {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            width,
        }
    }

    #[rstest]
    #[case(format("", "", 6), 1, "000001")]
    #[case(format("", "", 6), 42, "000042")]
    #[case(format("PO-", "", 6), 7, "PO-000007")]
    #[case(format("NF", "/24", 4), 12, "NF0012/24")]
    #[case(format("", "", 3), 12345, "12345")]
    #[case(format("", "", 1), 0, "0")]
    fn renders_padded_numbers(
        #[case] fmt: NumberFormat,
        #[case] number: i64,
        #[case] expected: &str,
    ) {
        assert_eq!(fmt.render(number), expected);
    }

    #[rstest]
    #[case("purchase_order", "PURCHASE_ORDER")]
    #[case(" TICKET ", "TICKET")]
    #[case("NF_E2", "NF_E2")]
    fn doc_types_are_upper_cased(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(normalize_doc_type(raw).unwrap(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("purchase-order")]
    #[case("a b")]
    #[case("ABCDEFGHIJKLMNOPQRSTUVWXYZ_ABCDEFGHIJKLMNO")]
    fn rejects_malformed_doc_types(#[case] raw: &str) {
        assert!(matches!(
            normalize_doc_type(raw),
            Err(ServiceError::ValidationError(_))
        ));
    }

    #[test]
    fn branch_scope_defaults_to_tenant_wide() {
        let branch = Uuid::new_v4();
        assert_eq!(branch_scope(None), TENANT_WIDE_SCOPE);
        assert_eq!(branch_scope(Some(branch)), branch.to_string());
    }

    #[test]
    fn configure_input_limits() {
        let too_long = ConfigureSequence {
            prefix: "ABCDEFGHIJK".into(),
            width: Some(6),
            ..Default::default()
        };
        assert!(too_long.validate().is_err());

        let too_wide = ConfigureSequence {
            width: Some(21),
            ..Default::default()
        };
        assert!(too_wide.validate().is_err());

        let ok = ConfigureSequence {
            prefix: "PC-".into(),
            width: Some(8),
            start_after: 1200,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
    }
}
