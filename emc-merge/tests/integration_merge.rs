// End-to-end merge tests
//
// Runs the full pipeline (resolution, binary labels, grouping,
// consolidation, status, naming) against an in-memory lookup, so no test
// touches the network.

mod helpers;

use emc_common::config::MergeConfig;
use emc_common::table::CatalogRow;
use emc_common::{QuantityKind, SourceCatalog, SourceRecord, Status};
use emc_merge::merge::decision_log::{Decision, DecisionLog, RecordRef};
use emc_merge::merge::tier1::normalizer::normalize_all;
use emc_merge::merge::tier1::replacements::KnownMistakes;
use emc_merge::merge::types::{Flag, MergedEntry};
use emc_merge::output::entry_row;
use emc_merge::MergeError;
use helpers::{merge, merge_shared, planet, with_mass, with_period, MockLookup};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn rows(entries: &[MergedEntry<'_>]) -> Vec<Vec<String>> {
    entries.iter().map(entry_row).collect()
}

fn by_name<'e, 'a>(entries: &'e [MergedEntry<'a>], name: &str) -> &'e MergedEntry<'a> {
    entries
        .iter()
        .find(|e| e.exo_mercat_name == name)
        .unwrap_or_else(|| panic!("no entry named {}", name))
}

/// Two systems seen by several catalogs under different spellings
fn two_systems() -> (MockLookup, Vec<SourceRecord>) {
    let lookup = MockLookup::new()
        .with_star("WASP-900", "HD 100001", 10.0, 20.0)
        .with_star("WASP 900", "HD 100001", 10.0, 20.0)
        .with_star("Kepler-7000", "HD 700001", 290.0, 44.0);

    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "WASP-900", "b", 10.0, 20.0), 3.5, 0.01),
        with_period(planet(SourceCatalog::Eu, "WASP 900", "b", 10.0, 20.0), 3.5, 0.02),
        with_period(planet(SourceCatalog::Oec, "WASP-900", "b", 10.0, 20.0), 3.49, 0.05),
        with_period(planet(SourceCatalog::Nasa, "Kepler-7000", "b", 290.0, 44.0), 12.0, 0.1),
        with_period(planet(SourceCatalog::Nasa, "Kepler-7000", "c", 290.0, 44.0), 31.0, 0.2),
        with_period(planet(SourceCatalog::Eu, "Kepler-7000", "c", 290.0, 44.0), 31.1, 0.3),
    ];
    (lookup, records)
}

#[tokio::test]
async fn test_same_planet_from_three_catalogs_merges_once() {
    let (lookup, records) = two_systems();
    let (result, _log) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 3);
    let wasp = by_name(&entries, "HD 100001 b");
    assert_eq!(wasp.main_id, "HD 100001");
    assert_eq!(wasp.main_id_provenance.label(), "SIMBAD");
    assert_eq!(wasp.members.len(), 3);
    assert_eq!(
        wasp.catalogs.iter().copied().collect::<Vec<_>>(),
        vec![SourceCatalog::Nasa, SourceCatalog::Eu, SourceCatalog::Oec]
    );
    assert!(wasp.main_id_aliases.contains("WASP-900"));
    assert!(wasp.main_id_aliases.contains("WASP 900"));
    assert!(wasp.flags.is_empty());

    // Smallest relative error wins
    let period = wasp.quantity(QuantityKind::Period).unwrap();
    assert_eq!(period.value, 3.5);
    assert_eq!(period.catalog, SourceCatalog::Nasa);
    assert_eq!(period.catalog_list.len(), 3);

    let c = by_name(&entries, "HD 700001 c");
    assert_eq!(c.members.len(), 2);
}

#[tokio::test]
async fn test_merge_is_order_independent() {
    let (lookup, records) = two_systems();
    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let forward = rows(&result.unwrap());

    let (lookup, mut reversed) = two_systems();
    reversed.reverse();
    let (result, _) = merge(lookup, MergeConfig::default(), &reversed).await;
    let backward = rows(&result.unwrap());

    assert_eq!(forward, backward);
}

#[tokio::test]
async fn test_duplicate_rows_from_one_catalog_merge_independent_of_order() {
    let lookup = || MockLookup::new().with_star("Kepler-77", "HD 770001", 30.0, 15.0);
    let light = with_mass(
        with_period(planet(SourceCatalog::Eu, "Kepler-77", "b", 30.0, 15.0), 3.58, 0.01),
        1.0,
        0.1,
    );
    let heavy = with_mass(
        with_period(planet(SourceCatalog::Eu, "Kepler-77", "b", 30.0, 15.0), 3.58, 0.01),
        2.0,
        0.2,
    );

    let forward = vec![light.clone(), heavy.clone()];
    let (result, _) = merge(lookup(), MergeConfig::default(), &forward).await;
    let forward_entries = result.unwrap();

    let backward = vec![heavy, light];
    let (result, _) = merge(lookup(), MergeConfig::default(), &backward).await;
    let backward_entries = result.unwrap();

    // Equal relative errors; the tie resolves on the value itself
    let mass = |entries: &[MergedEntry<'_>]| {
        by_name(entries, "HD 770001 b")
            .quantity(QuantityKind::Mass)
            .unwrap()
            .value
    };
    assert_eq!(mass(&forward_entries), 1.0);
    assert_eq!(mass(&backward_entries), 1.0);
    assert_eq!(rows(&forward_entries), rows(&backward_entries));
}

#[tokio::test]
async fn test_merge_is_idempotent() {
    let (lookup, records) = two_systems();
    let (first, first_log) = merge(lookup, MergeConfig::default(), &records).await;

    let (lookup, _) = two_systems();
    let (second, second_log) = merge(lookup, MergeConfig::default(), &records).await;

    assert_eq!(rows(&first.unwrap()), rows(&second.unwrap()));
    assert_eq!(first_log.entries(), second_log.entries());
    assert_ne!(first_log.run_id(), second_log.run_id());
}

#[tokio::test]
async fn test_equal_values_fall_back_to_catalog_precedence() {
    let lookup = MockLookup::new().with_star("HAT-P-900", "HD 800001", 5.0, 5.0);
    let records = vec![
        with_period(planet(SourceCatalog::Eu, "HAT-P-900", "b", 5.0, 5.0), 2.0, 0.1),
        with_period(planet(SourceCatalog::Nasa, "HAT-P-900", "b", 5.0, 5.0), 2.0, 0.1),
    ];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();
    assert_eq!(entries[0].quantity(QuantityKind::Period).unwrap().catalog, SourceCatalog::Nasa);

    // Reversed precedence picks the other catalog
    let lookup = MockLookup::new().with_star("HAT-P-900", "HD 800001", 5.0, 5.0);
    let mut config = MergeConfig::default();
    config.catalogs.precedence = vec![
        SourceCatalog::Eu,
        SourceCatalog::Nasa,
        SourceCatalog::Oec,
        SourceCatalog::Epic,
        SourceCatalog::Koi,
    ];
    let (result, _) = merge(lookup, config, &records).await;
    let entries = result.unwrap();
    assert_eq!(entries[0].quantity(QuantityKind::Period).unwrap().catalog, SourceCatalog::Eu);
}

#[tokio::test]
async fn test_confirmed_status_wins_and_disagreement_is_recorded() {
    let lookup = MockLookup::new().with_star("Qatar-90", "HD 900001", 60.0, 30.0);
    let mut candidate = with_period(planet(SourceCatalog::Eu, "Qatar-90", "b", 60.0, 30.0), 4.0, 0.1);
    candidate.status = Status::Candidate;
    candidate.raw_status = "Candidate".to_string();
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Qatar-90", "b", 60.0, 30.0), 4.0, 0.1),
        candidate,
    ];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].checked_status, Status::Confirmed);
    assert!(entries[0].status_disagreement);
    assert_eq!(entries[0].original_status, "eu: Candidate, nasa: Confirmed");
}

fn conflicting_spellings() -> (MockLookup, Vec<SourceRecord>) {
    let lookup = MockLookup::new()
        .with_star("Kepler-1000", "HD 200001", 50.0, -10.0)
        .with_star("Kepler-1000 (alt)", "HD 200002", 50.0, -10.0);
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Kepler-1000", "b", 50.0, -10.0), 5.0, 0.1),
        with_period(planet(SourceCatalog::Eu, "Kepler-1000 (alt)", "b", 50.0, -10.0), 5.0, 0.1),
    ];
    (lookup, records)
}

#[tokio::test]
async fn test_unforced_identity_conflict_aborts_run() {
    let (lookup, records) = conflicting_spellings();
    let (result, log) = merge(lookup, MergeConfig::default(), &records).await;

    match result {
        Err(MergeError::IdentityConflict {
            main_id_a, main_id_b, ..
        }) => {
            assert_eq!(main_id_a, "HD 200001");
            assert_eq!(main_id_b, "HD 200002");
        }
        Err(other) => panic!("unexpected error: {}", other),
        Ok(entries) => panic!("run should abort, got {} entries", entries.len()),
    }
    assert_eq!(log.count("identity_conflict"), 1);
}

#[tokio::test]
async fn test_override_on_one_spelling_settles_identity() {
    let (lookup, records) = conflicting_spellings();
    let mut config = MergeConfig::default();
    config
        .overrides
        .insert("Kepler-1000 (alt)".to_string(), "HD 200001".to_string());

    let (result, log) = merge(lookup, config, &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].main_id, "HD 200001");
    assert_eq!(entries[0].main_id_provenance.label(), "OVERRIDE");
    assert_eq!(entries[0].members.len(), 2);
    assert!(log.count("forced_override") >= 1);
}

#[tokio::test]
async fn test_override_elsewhere_in_linked_group_settles_conflict() {
    let (lookup, mut records) = conflicting_spellings();
    records.push(with_period(
        planet(SourceCatalog::Oec, "KEPLER-1000", "b", 50.0, -10.0),
        5.0,
        0.1,
    ));
    let mut config = MergeConfig::default();
    config
        .overrides
        .insert("KEPLER-1000".to_string(), "HD 200001".to_string());

    let (result, log) = merge(lookup, config, &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].main_id, "HD 200001");
    assert_eq!(entries[0].members.len(), 3);
    assert_eq!(log.count("identity_conflict"), 1);
    assert!(log.count("forced_override") >= 2);
}

#[tokio::test]
async fn test_distant_periods_under_one_letter_are_kept_apart() {
    let lookup = MockLookup::new().with_star("Kepler-2000", "HD 300001", 80.0, 5.0);
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Kepler-2000", "b", 80.0, 5.0), 10.0, 0.1),
        with_period(planet(SourceCatalog::Nasa, "Kepler-2000", "b", 80.0, 5.0), 400.0, 1.0),
    ];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 2);
    let short = by_name(&entries, "HD 300001 b");
    let long = by_name(&entries, "HD 300001 b (2)");
    assert_eq!(short.quantity(QuantityKind::Period).unwrap().value, 10.0);
    assert_eq!(long.quantity(QuantityKind::Period).unwrap().value, 400.0);
    assert!(short.flags.is_set(Flag::DuplicateCatalog));
    assert!(long.flags.is_set(Flag::DuplicateCatalog));
}

#[tokio::test]
async fn test_unresolved_host_is_kept_and_flagged() {
    let records = vec![planet(SourceCatalog::Nasa, "Mystery-1", "b", 1.0, 1.0)];
    let (result, log) = merge(MockLookup::new(), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].main_id, "Mystery-1");
    assert_eq!(entries[0].main_id_provenance.label(), "nasa");
    assert_eq!(entries[0].exo_mercat_name, "Mystery-1 b");
    assert!(entries[0].flags.is_set(Flag::Unresolved));
    assert!(log.count("flag_raised") >= 1);
}

#[tokio::test]
async fn test_brown_dwarfs_are_removed() {
    let lookup = MockLookup::new().with_star("Kepler-3000", "HD 310001", 100.0, 12.0);
    let records = vec![
        with_mass(planet(SourceCatalog::Nasa, "Kepler-3000", "b", 100.0, 12.0), 30.0, 1.0),
        with_mass(planet(SourceCatalog::Nasa, "Kepler-3000", "c", 100.0, 12.0), 1.2, 0.1),
    ];

    let (result, log) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exo_mercat_name, "HD 310001 c");
    assert_eq!(entries[0].best_mass(), Some(1.2));
    assert_eq!(log.count("brown_dwarf_removed"), 1);
}

#[tokio::test]
async fn test_transient_failure_is_retried_then_left_unresolved() {
    let lookup = Arc::new(MockLookup::new().failing("Kepler-4000"));
    let records = vec![planet(SourceCatalog::Eu, "Kepler-4000", "b", 30.0, 30.0)];

    let (result, log) = merge_shared(Arc::clone(&lookup), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    // One attempt plus one retry
    assert_eq!(lookup.calls("Kepler-4000"), 2);
    assert_eq!(log.count("lookup_failed"), 1);
    assert_eq!(entries[0].main_id, "Kepler-4000");
    assert!(entries[0].flags.is_set(Flag::Unresolved));
}

#[tokio::test]
async fn test_repeated_queries_are_looked_up_once() {
    let lookup = Arc::new(MockLookup::new().with_star("Kepler-7000", "HD 700001", 290.0, 44.0));
    let (_, records) = two_systems();

    let (result, _) = merge_shared(Arc::clone(&lookup), MergeConfig::default(), &records).await;
    assert!(result.is_ok());
    assert_eq!(lookup.calls("Kepler-7000"), 1);
}

#[tokio::test]
async fn test_host_names_are_looked_up_in_batches() {
    let mut lookup = MockLookup::new().batched(2);
    let mut records = Vec::new();
    for i in 0..5 {
        let host = format!("Kepler-80{}", i);
        lookup = lookup.with_star(&host, &format!("HD 8000{}", i), 10.0 * i as f64, 5.0);
        records.push(planet(SourceCatalog::Eu, &host, "b", 10.0 * i as f64, 5.0));
    }
    let lookup = Arc::new(lookup);

    let (result, log) = merge_shared(Arc::clone(&lookup), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(lookup.batch_calls(), 3);
    assert_eq!(lookup.calls("Kepler-803"), 1);
    assert_eq!(entries.len(), 5);
    assert!(entries.iter().all(|e| e.main_id.starts_with("HD 8000")));
    assert_eq!(log.count("lookup_failed"), 0);
}

#[tokio::test]
async fn test_failed_batch_fails_every_name_in_it() {
    let lookup = Arc::new(
        MockLookup::new()
            .batched(2)
            .with_star("Kepler-811", "HD 81100", 40.0, 5.0)
            .failing("Kepler-810"),
    );
    let records = vec![
        planet(SourceCatalog::Eu, "Kepler-810", "b", 30.0, 5.0),
        planet(SourceCatalog::Eu, "Kepler-811", "b", 40.0, 5.0),
    ];

    let (result, log) = merge_shared(Arc::clone(&lookup), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    // One attempt plus one retry for the shared batch
    assert_eq!(lookup.batch_calls(), 2);
    assert_eq!(log.count("lookup_failed"), 2);
    assert!(entries.iter().all(|e| e.flags.is_set(Flag::Unresolved)));
}

#[tokio::test]
async fn test_catalog_component_disagreeing_with_resolved_one_is_logged() {
    let lookup = MockLookup::new().with_star("Kepler-820", "HD 82000 A", 50.0, 8.0);
    let mut record = planet(SourceCatalog::Eu, "Kepler-820", "b", 50.0, 8.0);
    record.binary = "B".to_string();
    let records = vec![record];

    let (result, log) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries[0].main_id, "HD 82000");
    assert_eq!(
        log.entries()
            .iter()
            .find(|d| d.kind() == "component_disagreement"),
        Some(&Decision::ComponentDisagreement {
            main_id: "HD 82000".to_string(),
            catalog_binary: "B".to_string(),
            resolved_binary: "A".to_string(),
            record: RecordRef {
                catalog: SourceCatalog::Eu,
                name: "Kepler-820 b".to_string(),
            },
        })
    );
}

#[tokio::test]
async fn test_survey_id_fallback() {
    let lookup = MockLookup::new().with_tic(123456789, "TOI-9999", 15.0, 15.0);
    let records = vec![planet(SourceCatalog::Epic, "TIC 123456789", "b", 15.0, 15.0)];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries[0].main_id, "TOI-9999");
    assert_eq!(entries[0].main_id_provenance.label(), "TIC");
    assert!(!entries[0].flags.is_set(Flag::Unresolved));
}

#[tokio::test]
async fn test_coordinate_fallback() {
    let lookup = MockLookup::new().with_cone_star("HD 400001", 120.0, -45.0);
    let records = vec![planet(SourceCatalog::Koi, "Unknown-1", "b", 120.0, -45.0)];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries[0].main_id, "HD 400001");
    assert_eq!(entries[0].main_id_provenance.label(), "SIMBADCOORD");
}

#[tokio::test]
async fn test_distant_resolution_raises_angular_separation_flag() {
    let lookup = MockLookup::new().with_star("Kepler-5000", "HD 500001", 200.0, 10.0);
    let records = vec![planet(SourceCatalog::Nasa, "Kepler-5000", "b", 200.5, 10.0)];

    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries[0].main_id, "HD 500001");
    assert!(entries[0].flags.is_set(Flag::AngularSeparation));
    assert!(entries[0].angular_separation_deg.unwrap() > 0.4);
}

fn coordinate_mismatch_flags(log: &DecisionLog) -> Vec<&str> {
    log.entries()
        .iter()
        .filter_map(|d| match d {
            Decision::FlagRaised {
                flag: Flag::CoordinateMismatch,
                main_id,
                ..
            } => Some(main_id.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_distinct_identifiers_at_one_position_are_flagged() {
    let lookup = MockLookup::new()
        .with_star("Alpha-1", "HD 11", 45.0, -5.0)
        .with_star("Beta-2", "HD 22", 45.0, -5.0);
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Alpha-1", "b", 45.0, -5.0), 2.0, 0.1),
        with_period(planet(SourceCatalog::Eu, "Beta-2", "b", 45.0, -5.0), 9.0, 0.1),
    ];

    let (result, log) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    // Not merged, only flagged for review
    assert_eq!(entries.len(), 2);
    assert!(by_name(&entries, "HD 11 b").flags.is_set(Flag::CoordinateMismatch));
    assert!(by_name(&entries, "HD 22 b").flags.is_set(Flag::CoordinateMismatch));
    assert_eq!(coordinate_mismatch_flags(&log), vec!["HD 11"]);
}

#[tokio::test]
async fn test_unresolved_host_with_disagreeing_positions_is_flagged() {
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Mystery-2", "b", 1.0, 1.0), 5.0, 0.1),
        with_period(planet(SourceCatalog::Eu, "Mystery-2", "b", 1.5, 1.0), 5.0, 0.1),
    ];

    let (result, log) = merge(MockLookup::new(), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].main_id, "Mystery-2");
    assert!(entries[0].flags.is_set(Flag::Unresolved));
    assert!(entries[0].flags.is_set(Flag::CoordinateMismatch));
    assert_eq!(coordinate_mismatch_flags(&log), vec!["Mystery-2"]);
}

#[tokio::test]
async fn test_agreeing_positions_raise_no_coordinate_flag() {
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Mystery-3", "b", 1.0, 1.0), 5.0, 0.1),
        with_period(planet(SourceCatalog::Eu, "Mystery-3", "b", 1.0, 1.0), 5.0, 0.1),
    ];

    let (result, log) = merge(MockLookup::new(), MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert!(!entries[0].flags.is_set(Flag::CoordinateMismatch));
    assert!(coordinate_mismatch_flags(&log).is_empty());
}

#[tokio::test]
async fn test_shared_external_ids_unify_identifiers() {
    let lookup = MockLookup::new()
        .with_star_ids("Kepler-6000", "HD 600001", 250.0, 30.0, &["Gaia DR3 600"])
        .with_star_ids("K2-600", "BD+10 600", 250.0, 30.0, &["Gaia DR3 600"]);
    let records = vec![
        with_period(planet(SourceCatalog::Nasa, "Kepler-6000", "b", 250.0, 30.0), 8.0, 0.1),
        with_period(planet(SourceCatalog::Epic, "K2-600", "b", 250.0, 30.0), 8.0, 0.1),
    ];

    let (result, log) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].main_id, "BD+10 600");
    assert_eq!(log.count("identifier_unified"), 1);
}

#[tokio::test]
async fn test_normalized_tables_merge_with_absolute_errors() {
    let nasa = vec![CatalogRow::from_pairs(
        1,
        [
            ("name", "WASP-900 b"),
            ("host", "WASP-900"),
            ("letter", "b"),
            ("ra", "10.0"),
            ("dec", "20.0"),
            ("status", "Confirmed"),
            ("p", "3.5"),
            ("p_min", "-0.2"),
            ("p_max", "0.3"),
            ("e", "1.5"),
        ],
    )];
    let eu = vec![CatalogRow::from_pairs(
        1,
        [
            ("name", "WASP 900 b"),
            ("host", "WASP 900"),
            ("letter", "b"),
            ("ra", "10.0"),
            ("dec", "20.0"),
            ("status", "Confirmed"),
            ("p", "3.52"),
            ("p_min", "-0.5"),
            ("p_max", "0.5"),
        ],
    )];

    let mut log = DecisionLog::new();
    let tables = [(SourceCatalog::Eu, eu), (SourceCatalog::Nasa, nasa)];
    let records = normalize_all(&tables, &KnownMistakes::default(), &mut log).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(log.count("value_removed"), 1);

    let (lookup, _) = two_systems();
    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    let entries = result.unwrap();

    assert_eq!(entries.len(), 1);
    let period = entries[0].quantity(QuantityKind::Period).unwrap();
    assert_eq!(period.value, 3.5);
    assert_eq!(period.error_min, Some(0.2));
    assert_eq!(period.provenance, "nasa");
    assert!(entries[0].quantity(QuantityKind::Eccentricity).is_none());
    assert!(!entries[0].removed_values.is_empty());

    for entry in &entries {
        for q in entry.quantities.values() {
            assert!(q.error_min.map_or(true, |e| e >= 0.0));
            assert!(q.error_max.map_or(true, |e| e >= 0.0));
        }
    }
}

fn wasp_row(name: &str, host: &str) -> CatalogRow {
    CatalogRow::from_pairs(
        1,
        [
            ("name", name),
            ("host", host),
            ("letter", "b"),
            ("ra", "10.0"),
            ("dec", "20.0"),
            ("status", "Confirmed"),
            ("p", "3.5"),
            ("p_min", "0.01"),
            ("p_max", "0.01"),
        ],
    )
}

#[tokio::test]
async fn test_known_mistake_correction_lets_catalogs_merge() {
    let tables = [
        (SourceCatalog::Eu, vec![wasp_row("WASP-900 b", "WASP-900x")]),
        (SourceCatalog::Nasa, vec![wasp_row("WASP-900 b", "WASP-900")]),
    ];

    // Uncorrected, the misspelled host stays unresolved and apart
    let mut log = DecisionLog::new();
    let records = normalize_all(&tables, &KnownMistakes::default(), &mut log).unwrap();
    let (lookup, _) = two_systems();
    let (result, _) = merge(lookup, MergeConfig::default(), &records).await;
    assert_eq!(result.unwrap().len(), 2);

    let config = MergeConfig::from_toml_str(
        r#"
        [replacements.host_to_host]
        "WASP-900x" = "WASP-900"
        "#,
    )
    .unwrap();
    let mut log = DecisionLog::new();
    let records = normalize_all(&tables, &KnownMistakes::from_config(&config.replacements), &mut log).unwrap();
    assert_eq!(log.count("known_mistake_corrected"), 1);

    let (lookup, _) = two_systems();
    let (result, _) = merge(lookup, config, &records).await;
    let entries = result.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].exo_mercat_name, "HD 100001 b");
    assert_eq!(entries[0].members.len(), 2);
}

#[tokio::test]
async fn test_decision_log_is_json_lines() {
    let records = vec![planet(SourceCatalog::Nasa, "Mystery-1", "b", 1.0, 1.0)];
    let (_, log) = merge(MockLookup::new(), MergeConfig::default(), &records).await;

    let mut buffer = Vec::new();
    log.write_jsonl(&mut buffer).unwrap();
    let text = String::from_utf8(buffer).unwrap();

    let lines: Vec<serde_json::Value> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(lines.len(), log.entries().len());
    for line in &lines {
        assert_eq!(line["run_id"], serde_json::json!(log.run_id().to_string()));
        assert!(line["type"].is_string());
    }
}
