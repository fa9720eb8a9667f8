use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Planac ERP API",
        version = "1.0.0",
        description = r#"
# Planac ERP ledger API

Receivables and payables with partial settlement, till cash sessions and
physical inventory counts, plus the shared document numbering and audit trail.

## Request context

Every `/api/v1` call carries the caller identity set by the upstream gateway:

```
x-tenant-id: <uuid>
x-user-id: <uuid>
x-branch-id: <uuid>   (optional)
```

## Pagination

List endpoints take `page` (default 1) and `limit` and answer with
`{data: [...], pagination: {page, limit, total, pages}}`.

## Errors

```json
{
  "error": "Unprocessable Entity",
  "code": "insufficient_funds",
  "message": "Insufficient funds: withdrawal of 500.00 exceeds cash on hand of 120.00",
  "request_id": "req-abc123",
  "timestamp": "2024-01-01T00:00:00Z"
}
```
        "#,
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers((url = "http://localhost:8080", description = "Local development")),
    tags(
        (name = "ledger", description = "Receivables and payables"),
        (name = "cash", description = "Tills and cash sessions"),
        (name = "inventory", description = "Physical inventory counts"),
        (name = "numbering", description = "Document number sequences"),
        (name = "audit", description = "Audit trail"),
        (name = "health", description = "Liveness")
    ),
    paths(
        crate::health_check,

        crate::handlers::ledger_documents::create_document,
        crate::handlers::ledger_documents::list_documents,
        crate::handlers::ledger_documents::ledger_summary,
        crate::handlers::ledger_documents::cash_flow,
        crate::handlers::ledger_documents::get_document,
        crate::handlers::ledger_documents::update_document,
        crate::handlers::ledger_documents::settle_document,
        crate::handlers::ledger_documents::cancel_document,
        crate::handlers::ledger_documents::reschedule_document,
        crate::handlers::ledger_documents::reconcile_document,

        crate::handlers::tills::create_till,
        crate::handlers::tills::list_tills,
        crate::handlers::tills::get_till,
        crate::handlers::tills::update_till,

        crate::handlers::cash_sessions::open_session,
        crate::handlers::cash_sessions::current_session,
        crate::handlers::cash_sessions::close_current_session,
        crate::handlers::cash_sessions::list_sessions,
        crate::handlers::cash_sessions::get_session,
        crate::handlers::cash_sessions::post_supply,
        crate::handlers::cash_sessions::post_withdrawal,
        crate::handlers::cash_sessions::record_sale,
        crate::handlers::cash_sessions::close_session,

        crate::handlers::inventory_counts::create_count,
        crate::handlers::inventory_counts::list_counts,
        crate::handlers::inventory_counts::counts_summary,
        crate::handlers::inventory_counts::get_count,
        crate::handlers::inventory_counts::generate_lines,
        crate::handlers::inventory_counts::list_lines,
        crate::handlers::inventory_counts::start_count,
        crate::handlers::inventory_counts::record_count,
        crate::handlers::inventory_counts::record_counts,
        crate::handlers::inventory_counts::finalize_count,
        crate::handlers::inventory_counts::adjust_stock,
        crate::handlers::inventory_counts::cancel_count,

        crate::handlers::sequences::list_sequences,
        crate::handlers::sequences::configure_sequence,
        crate::handlers::sequences::preview_number,
        crate::handlers::sequences::next_number,

        crate::handlers::audit_logs::search_audit_logs,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::db::PaginationMeta,
            crate::entities::PaymentMethod,
            crate::entities::FlowDirection,
            crate::entities::ledger_document::LedgerKind,
            crate::entities::ledger_document::DocumentStatus,
            crate::entities::ledger_document::DocumentType,
            crate::entities::ledger_document::PayableCategory,
            crate::entities::bank_ledger_entry::Model,
            crate::entities::audit_log::Model,
            crate::services::settlement::BreakdownLine,
            crate::services::cash_sessions::InformedAmount,
            crate::services::cash_sessions::MethodTotals,
            crate::services::inventory_counts::LineState,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_domain() {
        let json = serde_json::to_string(&ApiDocV1::openapi()).unwrap();
        assert!(json.contains("Planac ERP API"));
        assert!(json.contains("/api/v1/{kind}/{id}/settle"));
        assert!(json.contains("/api/v1/{kind}/cash-flow"));
        assert!(json.contains("/api/v1/cash-sessions/{id}/withdrawals"));
        assert!(json.contains("/api/v1/inventory-counts/{id}/adjust-stock"));
        assert!(json.contains("/api/v1/sequences/{doc_type}/next"));
    }
}
