//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_log;
pub mod customer_balance;
pub mod deal_price;
pub mod filling_history;
pub mod filling_request;
pub mod voucher;
pub mod voucher_history;
pub mod voucher_item;

// Re-export specific types to avoid conflicts
pub use audit_log::{Column as AuditLogColumn, Entity as AuditLog, Model as AuditLogModel};
pub use customer_balance::{
    Column as CustomerBalanceColumn, Entity as CustomerBalance, Model as CustomerBalanceModel,
};
pub use deal_price::{
    Column as DealPriceColumn, DealPriceStatus, Entity as DealPrice, Model as DealPriceModel,
};
pub use filling_history::{
    Column as FillingHistoryColumn, Entity as FillingHistory, HistoryType,
    Model as FillingHistoryModel,
};
pub use filling_request::{
    Column as FillingRequestColumn, Entity as FillingRequest, FillingStatus,
    Model as FillingRequestModel, PaymentStatus,
};
pub use voucher::{Column as VoucherColumn, Entity as Voucher, Model as VoucherModel, VoucherStatus};
pub use voucher_history::{
    Column as VoucherHistoryColumn, Entity as VoucherHistory, Model as VoucherHistoryModel,
    VoucherAction,
};
pub use voucher_item::{Column as VoucherItemColumn, Entity as VoucherItem, Model as VoucherItemModel};
