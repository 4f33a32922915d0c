//! # Invoice Controller
//!
//! A Kubernetes controller that turns `Invoice` resources into a rendered PDF
//! and a small viewer stack serving it.
//!
//! ## Overview
//!
//! For every `Invoice` the controller:
//!
//! 1. **Generates the document** - renders `spec.invoiceData` to PDF
//! 2. **Stores it** - in a Secret named after the invoice
//! 3. **Serves it** - through a viewer Deployment mounting that Secret and a ClusterIP Service
//! 4. **Exposes it** - through an Ingress when `spec.exposure.ingress` is enabled
//! 5. **Reports back** - phase, message, endpoint and observed generation in status
//!
//! All children carry a controller owner reference, so deleting the invoice
//! deletes them through Kubernetes garbage collection.
//!
//! Failed passes are retried after 15 seconds; successful passes wait for the
//! next change to the invoice or one of its children.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod generator;
pub mod observability;
pub mod runtime;

pub use crd::{Invoice, InvoicePhase, InvoiceSpec, InvoiceStatus};
