// Open Exoplanet Catalogue strategy
//
// Status comes from the system's list membership.

use emc_common::{SourceCatalog, Status};

use crate::merge::tier1::normalizer::CatalogNormalizer;

pub struct OecNormalizer;

impl CatalogNormalizer for OecNormalizer {
    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::Oec
    }

    fn assign_status(&self, raw_status: &str) -> Status {
        match raw_status.trim() {
            s if s.contains("Confirmed") => Status::Confirmed,
            s if s.contains("Controversial") || s.contains("Kepler Objects of Interest") => {
                Status::Candidate
            }
            s if s.contains("Retracted") => Status::Retracted,
            _ => Status::Unconfirmed,
        }
    }

    fn handle_reference_format(&self, _raw: &str) -> String {
        self.catalog().to_string()
    }
}
