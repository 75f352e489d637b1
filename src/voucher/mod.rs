//! Voucher workbook assembly against per-GSTIN X2Beta templates.

mod expense;
mod sales;
mod template;

pub use expense::{assemble_expense_workbook, expense_workbook_name};
pub use sales::{VoucherStats, assemble_sales_workbook, sales_workbook_name};
pub use template::{
    EXPENSE_HEADERS, SALES_HEADERS, Template, TemplateKind, TemplateProbe, TemplateRegistry,
    TemplateSchema, seed_template,
};
