//! Master bill pre-fill from an uploaded bill image or PDF.
//!
//! The document-understanding service is an external collaborator behind
//! `BillExtractor`. Its output is only ever a suggestion: nothing here
//! mutates a period.

use crate::{
    error::{BillingError, BillingResult},
    inputs::MasterBillEntry,
    period::MasterBill,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BillExtraction {
    pub total_units:    f64,
    pub energy_charges: f64,
    pub fixed_charges:  f64,
    pub taxes:          f64,
}

impl BillExtraction {
    /// Overlay the extracted figures on the current bill without committing.
    pub fn suggest(&self, current: &MasterBill) -> MasterBill {
        MasterBill {
            total_units:    self.total_units,
            energy_charges: self.energy_charges,
            fixed_charges:  self.fixed_charges,
            taxes:          self.taxes,
            uploaded:       current.uploaded,
        }
    }

    pub fn as_entry(&self) -> MasterBillEntry {
        MasterBillEntry {
            total_units:    self.total_units,
            energy_charges: self.energy_charges,
            fixed_charges:  self.fixed_charges,
            taxes:          self.taxes,
        }
    }
}

pub trait BillExtractor {
    fn extract(&self, bytes: &[u8], media_type: &str) -> BillingResult<BillExtraction>;
}

/// Raw collaborator payload; every field may be missing or null.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawExtraction {
    #[serde(default)]
    total_units:    Option<f64>,
    #[serde(default)]
    energy_charges: Option<f64>,
    #[serde(default)]
    fixed_charges:  Option<f64>,
    #[serde(default)]
    taxes:          Option<f64>,
}

/// Parse the collaborator's JSON answer. Missing or null figures become 0;
/// anything that is not a number is an extraction failure.
pub fn parse_extraction(raw: &str) -> BillingResult<BillExtraction> {
    let parsed: RawExtraction = serde_json::from_str(raw)
        .map_err(|e| BillingError::Extraction(format!("unparseable response: {e}")))?;
    Ok(BillExtraction {
        total_units:    parsed.total_units.unwrap_or(0.0),
        energy_charges: parsed.energy_charges.unwrap_or(0.0),
        fixed_charges:  parsed.fixed_charges.unwrap_or(0.0),
        taxes:          parsed.taxes.unwrap_or(0.0),
    })
}

/// Bills arrive as photos or PDFs.
pub fn check_upload(bytes: &[u8], media_type: &str) -> BillingResult<()> {
    if bytes.is_empty() {
        return Err(BillingError::Extraction("empty upload".into()));
    }
    let media_type = media_type.trim().to_ascii_lowercase();
    if media_type.starts_with("image/") || media_type == "application/pdf" {
        Ok(())
    } else {
        Err(BillingError::Extraction(format!(
            "unsupported media type '{media_type}'"
        )))
    }
}

/// Run an extractor with the upload checks applied. Failures are logged and
/// returned; the caller falls back to manual entry.
pub fn extract_bill(
    extractor: &dyn BillExtractor,
    bytes: &[u8],
    media_type: &str,
) -> BillingResult<BillExtraction> {
    check_upload(bytes, media_type)?;
    extractor.extract(bytes, media_type).map_err(|e| {
        log::warn!("Bill extraction failed, falling back to manual entry: {e}");
        match e {
            BillingError::Extraction(_) => e,
            other => BillingError::Extraction(other.to_string()),
        }
    })
}
