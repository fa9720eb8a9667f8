pub mod audit_logs;
pub mod cash_sessions;
pub mod common;
pub mod inventory_counts;
pub mod ledger_documents;
pub mod sequences;
pub mod tills;

use crate::{
    config::AppConfig,
    db::DbPool,
    services::{
        audit::AuditService, cash_sessions::CashSessionService,
        inventory_counts::InventoryCountService, numbering::NumberingService,
        settlement::SettlementService, tills::TillService,
    },
};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub audit: Arc<AuditService>,
    pub numbering: Arc<NumberingService>,
    pub settlement: Arc<SettlementService>,
    pub tills: Arc<TillService>,
    pub cash_sessions: Arc<CashSessionService>,
    pub inventory_counts: Arc<InventoryCountService>,
}

impl AppServices {
    pub fn new(db_pool: Arc<DbPool>, config: &AppConfig) -> Self {
        let audit = AuditService::new(db_pool.clone());
        let numbering = NumberingService::new(
            db_pool.clone(),
            audit.clone(),
            config.numbering_max_attempts,
            config.numbering_default_width,
        );

        let settlement = SettlementService::new(db_pool.clone(), numbering.clone(), audit.clone());
        let tills = TillService::new(db_pool.clone(), audit.clone());
        let cash_sessions = CashSessionService::new(db_pool.clone(), audit.clone());
        let inventory_counts =
            InventoryCountService::new(db_pool, numbering.clone(), audit.clone());

        Self {
            audit: Arc::new(audit),
            numbering: Arc::new(numbering),
            settlement: Arc::new(settlement),
            tills: Arc::new(tills),
            cash_sessions: Arc::new(cash_sessions),
            inventory_counts: Arc::new(inventory_counts),
        }
    }
}
