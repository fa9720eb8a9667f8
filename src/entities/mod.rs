pub mod allocated_number;
pub mod audit_log;
pub mod bank_ledger_entry;
pub mod cash_closing_line;
pub mod cash_movement;
pub mod cash_session;
pub mod enums;
pub mod inventory_count;
pub mod inventory_count_line;
pub mod ledger_document;
pub mod ledger_posting;
pub mod posting_breakdown;
pub mod product;
pub mod sequence_setting;
pub mod stock_level;
pub mod stock_location;
pub mod stock_movement;
pub mod till;

pub use enums::{FlowDirection, PaymentMethod};
