// Crime catalog - historical records keyed by crime type

use crate::core::errors::AccessError;
use crate::core::models::CrimeRecord;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Container for the catalog YAML structure
#[derive(Debug, Deserialize)]
struct CrimeCatalogYaml {
    crimes: BTreeMap<String, Vec<CrimeRecord>>,
}

/// Search result: the matched crime type and its records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch<'a> {
    pub crime_type: &'a str,
    pub records: &'a [CrimeRecord],
}

/// Read-only catalog of historical crime records.
/// Types are kept sorted so searches resolve deterministically.
#[derive(Debug, Clone, Default)]
pub struct CrimeCatalog {
    crimes: BTreeMap<String, Vec<CrimeRecord>>,
}

impl CrimeCatalog {
    /// Load catalog from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AccessError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(AccessError::ConfigurationError(format!(
                "Crime catalog not found at {:?}",
                path_ref
            )));
        }

        let yaml_content = fs::read_to_string(path_ref).map_err(|e| {
            AccessError::ConfigurationError(format!("Failed to read crime catalog: {}", e))
        })?;

        Self::from_yaml(&yaml_content)
    }

    pub fn from_yaml(yaml_content: &str) -> Result<Self, AccessError> {
        let catalog: CrimeCatalogYaml = serde_yaml::from_str(yaml_content).map_err(|e| {
            AccessError::ConfigurationError(format!("Failed to parse crime catalog YAML: {}", e))
        })?;
        Self::from_records(catalog.crimes)
    }

    /// Build from in-memory records; case numbers must be unique across types
    pub fn from_records(crimes: BTreeMap<String, Vec<CrimeRecord>>) -> Result<Self, AccessError> {
        let mut seen = std::collections::HashSet::new();
        for (crime_type, records) in &crimes {
            for record in records {
                if !seen.insert(record.case_number.as_str()) {
                    return Err(AccessError::ConfigurationError(format!(
                        "Duplicate case number '{}' under '{}'",
                        record.case_number, crime_type
                    )));
                }
            }
        }
        Ok(Self { crimes })
    }

    /// First crime type (in sorted order) whose name contains `term`,
    /// case-insensitively. A blank term matches nothing.
    pub fn search(&self, term: &str) -> Option<CatalogMatch<'_>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return None;
        }

        self.crimes
            .iter()
            .find(|(crime_type, _)| crime_type.to_lowercase().contains(&needle))
            .map(|(crime_type, records)| CatalogMatch {
                crime_type: crime_type.as_str(),
                records: records.as_slice(),
            })
    }

    /// Records matching `term`; empty when nothing matches
    pub fn search_records(&self, term: &str) -> &[CrimeRecord] {
        self.search(term).map(|m| m.records).unwrap_or_default()
    }

    pub fn find_case(&self, case_number: &str) -> Option<(&str, &CrimeRecord)> {
        self.crimes.iter().find_map(|(crime_type, records)| {
            records
                .iter()
                .find(|r| r.case_number == case_number)
                .map(|r| (crime_type.as_str(), r))
        })
    }

    pub fn crime_types(&self) -> Vec<&str> {
        self.crimes.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.crimes.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
