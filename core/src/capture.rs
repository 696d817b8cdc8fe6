//! Reading capture and anomaly flagging.
//!
//! Units here are computed from the captured closing value as-is: a closing
//! below opening yields negative units. The statement allocator uses its own
//! gate (`closing > 0`) and must not be unified with this path.

use crate::{
    config::FlagThresholds,
    error::{BillingError, BillingResult},
    period::{BillingPeriod, ReadingFlag, WorkflowStatus},
    types::TenantId,
};
use serde::{Deserialize, Serialize};

/// Result of classifying one closing value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagAssessment {
    pub difference:       f64,
    pub units:            f64,
    pub flag:             ReadingFlag,
    /// Operator advisory only; never stored on the reading.
    pub high_consumption: bool,
}

/// A closing value submitted by the field, with optional evidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingCapture {
    pub tenant_id: TenantId,
    pub closing:   f64,
    #[serde(default)]
    pub remarks:   Option<String>,
    #[serde(default)]
    pub photo:     Option<String>,
}

impl ReadingCapture {
    pub fn new(tenant_id: impl Into<TenantId>, closing: f64) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            closing,
            remarks: None,
            photo: None,
        }
    }

    pub fn with_remarks(mut self, remarks: impl Into<String>) -> Self {
        self.remarks = Some(remarks.into());
        self
    }

    pub fn with_photo(mut self, photo: impl Into<String>) -> Self {
        self.photo = Some(photo.into());
        self
    }
}

pub fn assess_reading(
    opening: f64,
    closing: f64,
    meter_multiplier: f64,
    thresholds: &FlagThresholds,
) -> FlagAssessment {
    let difference = closing - opening;
    let units = difference * meter_multiplier;

    let flag = if units > thresholds.spike_units {
        ReadingFlag::Spike
    } else if units == 0.0 && closing >= opening {
        ReadingFlag::Zero
    } else {
        ReadingFlag::Normal
    };

    FlagAssessment {
        difference,
        units,
        flag,
        high_consumption: units > thresholds.advisory_units,
    }
}

/// Record a closing value on one reading. Draft saves and final saves share
/// this path; both mark the reading captured.
pub fn capture_reading(
    period: &mut BillingPeriod,
    capture: ReadingCapture,
    thresholds: &FlagThresholds,
) -> BillingResult<FlagAssessment> {
    if period.status != WorkflowStatus::Draft {
        return Err(BillingError::PeriodFrozen {
            status: period.status,
            action: "capture readings".into(),
        });
    }
    if !capture.closing.is_finite() {
        return Err(BillingError::Validation(format!(
            "closing reading for '{}' must be a number",
            capture.tenant_id
        )));
    }

    let reading = period
        .reading_mut(&capture.tenant_id)
        .ok_or_else(|| BillingError::UnknownTenant {
            tenant_id: capture.tenant_id.clone(),
        })?;

    let assessment = assess_reading(
        reading.opening,
        capture.closing,
        reading.meter_multiplier,
        thresholds,
    );

    reading.closing     = capture.closing;
    reading.units       = assessment.units;
    reading.flag        = assessment.flag;
    reading.is_captured = true;
    reading.remarks     = capture.remarks;
    reading.photo       = capture.photo;

    if assessment.high_consumption {
        log::info!(
            "{}: high consumption for {} ({:.1} units)",
            period.period_key(),
            capture.tenant_id,
            assessment.units
        );
    }

    Ok(assessment)
}
