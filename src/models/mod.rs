pub mod costing_entry;
pub mod job_code;
pub mod linked_docs;
pub mod money;

pub use costing_entry::{ApprovalStatus, CostCategory, CostType, CostingEntry, EntrySource};
pub use job_code::{CodeSource, CostBucket, CostingSummary, JobCode, JobNature, JobStatus};
pub use linked_docs::{CostInvoice, LinkedDocRef, PurchaseOrder};
