//! Invoice Inbox: turns supplier invoices emailed to a tenant's inbound
//! address into reviewable invoice records.

pub mod app;
pub mod channels;
pub mod config;
pub mod error;
pub mod extraction;
pub mod llm;
pub mod ocr;
pub mod pipeline;
pub mod storage;
pub mod store;
