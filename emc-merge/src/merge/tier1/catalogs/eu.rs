// Exoplanet.eu strategy
//
// Status text is free-form ("Confirmed", "Candidate", "Controversial",
// "Retracted", "Unconfirmed"). References are replaced by the catalog name.

use emc_common::table::CatalogRow;
use emc_common::{SourceCatalog, SourceRecord, Status};

use crate::merge::tier1::normalizer::CatalogNormalizer;

pub struct EuNormalizer;

impl CatalogNormalizer for EuNormalizer {
    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::Eu
    }

    fn assign_status(&self, raw_status: &str) -> Status {
        let lower = raw_status.to_ascii_lowercase();
        if lower.contains("retracted") {
            Status::Retracted
        } else if lower.contains("unconfirmed") {
            Status::Unconfirmed
        } else if lower.contains("candidate") || lower.contains("controversial") {
            Status::Candidate
        } else {
            Status::Confirmed
        }
    }

    fn handle_reference_format(&self, _raw: &str) -> String {
        self.catalog().to_string()
    }

    fn remove_theoretical_masses(&self, row: &CatalogRow, record: &mut SourceRecord) {
        let theoretical = |col: &str| {
            row.text(col)
                .map(|p| p.contains("Theoretical"))
                .unwrap_or(false)
        };
        if theoretical("mass_provenance") {
            record.quantities.mass.theoretical = true;
            record.quantities.msini.theoretical = true;
        }
        if theoretical("radius_provenance") {
            record.quantities.radius.theoretical = true;
        }
    }
}
