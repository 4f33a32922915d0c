//! # Document Generator
//!
//! Turns a serialized invoice document into the bytes stored in the data
//! carrier Secret. The reconciler treats the generator as a black box: it
//! hands over YAML and gets bytes or a [`GenerationError`] back.

mod pdf;

pub use pdf::PdfInvoiceGenerator;

use crate::crd::InvoiceData;
use thiserror::Error;

/// Renders an invoice document
///
/// Rendering is CPU-bound and runs on the blocking thread pool.
pub trait DocumentGenerator: Send + Sync + 'static {
    /// Render the YAML invoice document to bytes
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError`] when the document cannot be parsed or fails validation.
    fn generate(&self, document: &str) -> Result<Vec<u8>, GenerationError>;
}

/// Document generation failure
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The invoice data could not be serialized for the generator
    #[error("unable to serialize invoice data: {0}")]
    Serialization(#[source] serde_yaml::Error),
    /// The document handed to the generator is not a valid invoice document
    #[error("unable to parse invoice document: {0}")]
    InvalidDocument(#[source] serde_yaml::Error),
    /// A required field is empty
    #[error("invoice {0} must not be empty")]
    MissingField(&'static str),
    /// A line item is not usable
    #[error("invoice item {index} is invalid: {reason}")]
    InvalidItem { index: usize, reason: String },
}

/// Serialize invoice data into the YAML document the generator consumes
///
/// # Errors
///
/// Returns [`GenerationError::Serialization`] if the data cannot be represented as YAML.
pub fn serialize_document(data: &InvoiceData) -> Result<String, GenerationError> {
    serde_yaml::to_string(data).map_err(GenerationError::Serialization)
}

/// Parse and validate a YAML invoice document
///
/// # Errors
///
/// Returns [`GenerationError`] for unparsable YAML or invalid content.
pub fn parse_document(document: &str) -> Result<InvoiceData, GenerationError> {
    let data: InvoiceData =
        serde_yaml::from_str(document).map_err(GenerationError::InvalidDocument)?;
    validate(&data)?;
    Ok(data)
}

fn validate(data: &InvoiceData) -> Result<(), GenerationError> {
    if data.number.trim().is_empty() {
        return Err(GenerationError::MissingField("number"));
    }
    if data.currency.trim().is_empty() {
        return Err(GenerationError::MissingField("currency"));
    }
    if data.items.is_empty() {
        return Err(GenerationError::MissingField("items"));
    }

    for (index, item) in data.items.iter().enumerate() {
        let invalid = |reason: &str| GenerationError::InvalidItem {
            index,
            reason: reason.to_string(),
        };
        if item.description.trim().is_empty() {
            return Err(invalid("description must not be empty"));
        }
        if !item.quantity.is_finite() || item.quantity <= 0.0 {
            return Err(invalid("quantity must be a positive number"));
        }
        if !item.unit_price.is_finite() || item.unit_price < 0.0 {
            return Err(invalid("unit price must not be negative"));
        }
        if !item.vat_rate.is_finite() || !(0.0..=1.0).contains(&item.vat_rate) {
            return Err(invalid("VAT rate must be between 0 and 1"));
        }
    }

    Ok(())
}
