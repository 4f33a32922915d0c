//! # Invoice Document
//!
//! Structured invoice data carried in `spec.invoiceData`.
//!
//! Every field defaults when absent so that a partially written resource can
//! still be read back; semantic checks happen in the generator.

use serde::{Deserialize, Serialize};

/// Invoice document rendered to PDF
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceData {
    /// Invoice number (e.g., "FV/2024/001")
    #[serde(default)]
    pub number: String,
    /// Issue date, free-form (e.g., "2024-01-31")
    #[serde(default)]
    pub issue_date: String,
    /// Sale date, free-form
    #[serde(default)]
    pub sale_date: String,
    /// Payment due date, free-form
    #[serde(default)]
    pub due_date: String,
    /// Free-form notes printed under the items table
    #[serde(default)]
    pub notes: String,
    /// Buyer and seller
    #[serde(default)]
    pub company: Company,
    /// Bank details for the payment
    #[serde(default)]
    pub bank: Bank,
    /// Line items
    #[serde(default)]
    pub items: Vec<Item>,
    /// ISO 4217 currency code (e.g., "USD", "EUR")
    #[serde(default)]
    pub currency: String,
    /// Signature line
    #[serde(default)]
    pub signature: String,
    /// Rendering options
    #[serde(default)]
    pub options: DocumentOptions,
}

/// Buyer and seller company records
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    #[serde(default)]
    pub buyer: Party,
    #[serde(default)]
    pub seller: Party,
}

/// One side of the invoice
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Party {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub address: String,
    /// VAT identification number
    #[serde(default)]
    pub vat: String,
}

/// Bank account details
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    #[serde(default)]
    pub account_number: String,
    #[serde(default)]
    pub swift: String,
}

/// Invoice line item
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub quantity: f64,
    /// Net price of one unit
    #[serde(default)]
    pub unit_price: f64,
    /// VAT rate as a fraction (0.2 = 20%)
    #[serde(default)]
    pub vat_rate: f64,
}

/// Rendering options of the PDF document
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DocumentOptions {
    /// Font family ("Arial", "Helvetica", "Times", "Courier")
    /// Default: "Arial"
    #[serde(default)]
    pub font: Option<String>,
}
