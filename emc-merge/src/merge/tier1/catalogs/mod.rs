// Tier 1: Per-Catalog Normalization Strategies
//
// One `CatalogNormalizer` per source catalog. Each overrides only the steps
// where its catalog differs from the shared behaviour.

pub mod epic;
pub mod eu;
pub mod koi;
pub mod nasa;
pub mod oec;

use emc_common::SourceCatalog;

use super::normalizer::CatalogNormalizer;

/// Strategy for a catalog
pub fn normalizer_for(catalog: SourceCatalog) -> Box<dyn CatalogNormalizer> {
    match catalog {
        SourceCatalog::Nasa => Box::new(nasa::NasaNormalizer),
        SourceCatalog::Eu => Box::new(eu::EuNormalizer),
        SourceCatalog::Oec => Box::new(oec::OecNormalizer),
        SourceCatalog::Epic => Box::new(epic::EpicNormalizer),
        SourceCatalog::Koi => Box::new(koi::KoiNormalizer),
    }
}
