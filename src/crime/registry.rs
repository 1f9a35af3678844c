// Crime registry - reads and admin-gated inserts against the crime store

use crate::api::CrimeStore;
use crate::auth::access_gate::{AccessGate, ProtectedView};
use crate::core::errors::{FetchError, WriteError};
use crate::core::models::{CrimeRecord, NewCrimeRecord};
use std::sync::Arc;
use tracing::{info, warn};

pub struct CrimeRegistry {
    store: Arc<dyn CrimeStore>,
    gate: AccessGate,
}

impl CrimeRegistry {
    pub fn new(store: Arc<dyn CrimeStore>, gate: AccessGate) -> Self {
        Self { store, gate }
    }

    pub async fn records_by_type(&self, crime_type: &str) -> Result<Vec<CrimeRecord>, FetchError> {
        self.store.records_by_type(crime_type.trim()).await
    }

    /// Insert a record. Rejected before any network call unless the
    /// crime-creation view would render for the current principal.
    pub async fn add_record(&self, record: NewCrimeRecord) -> Result<(), WriteError> {
        if !self.gate.decide_view(ProtectedView::CrimeCreation).is_render() {
            warn!(case_number = %record.record.case_number, "Rejected crime record insert from non-admin");
            return Err(WriteError::Unauthorized(
                "crime record creation requires admin".to_string(),
            ));
        }

        if record.crime_type.trim().is_empty() || record.record.case_number.trim().is_empty() {
            return Err(WriteError::Fetch(FetchError::Upstream {
                status: 400,
                code: None,
                message: "crime_type and case_number are required".to_string(),
            }));
        }

        self.store.insert_record(&record).await?;
        info!(
            crime_type = %record.crime_type,
            case_number = %record.record.case_number,
            "Crime record added"
        );
        Ok(())
    }
}
