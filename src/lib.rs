//! # bahi
//!
//! Multi-agent accounting pipeline that turns raw marketplace transaction
//! exports (sales reports, settlement reports, seller-fee invoices) into
//! Tally-ready X2Beta voucher workbooks: normalization, master-data
//! resolution with an approval queue, GST split and invoice numbering,
//! pivot aggregation, GST-rate batch partitioning, and voucher assembly.
//!
//! All monetary values use [`rust_decimal::Decimal`] — never floating
//! point — with half-away-from-zero rounding to 2 places.
//!
//! ## Quick Start
//!
//! ```no_run
//! use bahi::core::{ConfigBuilder, Gstin, Month, ReportType};
//! use bahi::io::{MemoryDatabase, MemoryStore, MemoryWorkbookStore, StaticPdfText};
//! use bahi::run::{Dependencies, RunRequest, run};
//!
//! let config = ConfigBuilder::new("gst-artifacts").build();
//! let db = MemoryDatabase::new();
//! let store = MemoryStore::new();
//! let workbooks = MemoryWorkbookStore::new();
//! let pdf = StaticPdfText::new();
//! let deps = Dependencies {
//!     db: &db,
//!     store: &store,
//!     workbooks: &workbooks,
//!     pdf: &pdf,
//!     cancel: None,
//! };
//!
//! let request = RunRequest::new(
//!     ReportType::AmazonMtr,
//!     Gstin::parse("06ABGCS4796R1ZA").unwrap(),
//!     Month::parse("2025-08").unwrap(),
//!     "reports/amazon_mtr_august.csv",
//! );
//! let summary = run(&config, &deps, &request).unwrap();
//! println!("{} artifacts, status {:?}", summary.artifacts.len(), summary.status);
//! ```
//!
//! ## Modules
//!
//! | Module | Responsibility |
//! |--------|----------------|
//! | `core` | Row types, error taxonomy, config, money, state tables |
//! | `normalize` | Channel-specific report readers → canonical rows |
//! | `master` | Item/ledger resolvers + approval queue |
//! | `tax` | GST split rule engine |
//! | `numbering` | Invoice number formats + durable sequences |
//! | `pivot` | Pivot aggregation + MIS summary |
//! | `batch` | GST-rate batch partitioning + reconciliation |
//! | `voucher` | X2Beta template registry + voucher assembly |
//! | `expense` | Seller fee-invoice parsing + expense mapping |
//! | `io` | Collaborator contracts with in-memory implementations |
//! | `run` | Run coordinator, retries, audit records |

pub mod batch;
pub mod core;
pub mod expense;
pub mod io;
pub mod master;
pub mod normalize;
pub mod numbering;
pub mod pivot;
pub mod run;
pub mod tax;
pub mod voucher;

// Re-export the types most callers touch.
pub use crate::core::{Channel, Config, ConfigBuilder, Gstin, Month, PipelineError, ReportType, RunStatus};
pub use crate::run::{Dependencies, RunRequest, RunSummary, run};
