// Kepler Objects of Interest strategy
//
// KOI names carry `.01`-style numbering instead of planet letters; the
// grouping engine maps those onto letters by period.

use emc_common::{SourceCatalog, Status};

use crate::merge::tier1::normalizer::{extract_href, CatalogNormalizer};

pub struct KoiNormalizer;

impl CatalogNormalizer for KoiNormalizer {
    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::Koi
    }

    fn assign_status(&self, raw_status: &str) -> Status {
        match raw_status.trim().to_ascii_uppercase().as_str() {
            "CONFIRMED" => Status::Confirmed,
            "CANDIDATE" => Status::Candidate,
            "FALSE POSITIVE" => Status::FalsePositive,
            _ => Status::Unconfirmed,
        }
    }

    fn handle_reference_format(&self, raw: &str) -> String {
        extract_href(raw).unwrap_or_else(|| self.catalog().to_string())
    }
}
