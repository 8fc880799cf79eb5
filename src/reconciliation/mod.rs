pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use record::{
    CardDetails, LifecycleStatus, PaymentRecord, SubPayment, VerificationStatus,
    INVOICE_REFERENCE_PREFIX, MAX_RECORDING_ATTEMPTS, STALE_AFTER_HOURS,
};
pub use store::ReconciliationStore;
