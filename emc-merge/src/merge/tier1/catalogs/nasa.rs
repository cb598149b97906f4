// NASA Exoplanet Archive strategy
//
// Every row of the archive is a confirmed planet. References arrive as HTML
// anchors; values whose reference says "Calculated" are model-derived.

use emc_common::table::CatalogRow;
use emc_common::{QuantityKind, SourceCatalog, SourceRecord, Status};

use crate::merge::tier1::normalizer::{extract_href, CatalogNormalizer};

pub struct NasaNormalizer;

impl CatalogNormalizer for NasaNormalizer {
    fn catalog(&self) -> SourceCatalog {
        SourceCatalog::Nasa
    }

    fn assign_status(&self, _raw_status: &str) -> Status {
        Status::Confirmed
    }

    fn handle_reference_format(&self, raw: &str) -> String {
        extract_href(raw).unwrap_or_else(|| {
            if raw.trim().is_empty() {
                self.catalog().to_string()
            } else {
                raw.trim().to_string()
            }
        })
    }

    fn remove_theoretical_masses(&self, row: &CatalogRow, record: &mut SourceRecord) {
        for kind in [QuantityKind::Mass, QuantityKind::Msini, QuantityKind::Radius] {
            let raw_ref = row.text_or_empty(&format!("{}_url", kind.column()));
            if raw_ref.contains("Calculated") {
                record.quantities.get_mut(kind).theoretical = true;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_always_confirmed() {
        assert_eq!(NasaNormalizer.assign_status(""), Status::Confirmed);
        assert_eq!(NasaNormalizer.assign_status("CANDIDATE"), Status::Confirmed);
    }

    #[test]
    fn test_calculated_mass_is_theoretical() {
        let row = CatalogRow::from_pairs(
            1,
            [
                ("mass_url", "<a href=https://exoplanetarchive.ipac.caltech.edu>Calculated Value</a>"),
                ("r_url", "<a href=https://ui.adsabs.harvard.edu/abs/2020A/abstract target=ref>"),
            ],
        );
        let mut record = SourceRecord::new(SourceCatalog::Nasa, "X b", "X", "b");
        NasaNormalizer.remove_theoretical_masses(&row, &mut record);
        assert!(record.quantities.mass.theoretical);
        assert!(!record.quantities.radius.theoretical);
        assert!(!record.quantities.msini.theoretical);
    }

    #[test]
    fn test_reference_fallbacks() {
        assert_eq!(NasaNormalizer.handle_reference_format(""), "nasa");
        assert_eq!(NasaNormalizer.handle_reference_format("2011ApJ...1"), "2011ApJ...1");
    }
}
