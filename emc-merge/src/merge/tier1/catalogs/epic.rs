// K2 / EPIC strategy

use emc_common::{SourceCatalog, Status};

use crate::merge::tier1::normalizer::{extract_href, CatalogNormalizer};

pub struct EpicNormalizer;

impl CatalogNormalizer for EpicNormalizer {
    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::Epic
    }

    fn assign_status(&self, raw_status: &str) -> Status {
        match raw_status.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Status::Confirmed,
            "CANDIDATE" => Status::Candidate,
            "FALSE POSITIVE" => Status::FalsePositive,
            "REFUTED" => Status::Retracted,
            _ => Status::Unconfirmed,
        }
    }

    fn handle_reference_format(&self, raw: &str) -> String {
        extract_href(raw).unwrap_or_else(|| self.catalog().to_string())
    }
}
