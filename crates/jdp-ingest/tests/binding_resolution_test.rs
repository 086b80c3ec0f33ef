//! Binding resolution and configuration-failure tests
//!
//! The resolver must fail closed: every header column resolves to exactly
//! one outcome or the file's ingest aborts before a single row streams.

use jdp_ingest::{
    BindingSet, ColumnBinding, EntityCatalog, FileConfig, IngestError, ManifestRegistry,
    MappingSpec,
};
use proptest::prelude::*;

const CATALOG: &str = r#"
entities:
  state_person:
    fields:
      person_external_id: numeric_id
      surname: string
      birthdate: date
    primary_key: [person_external_id]
  state_person_alias:
    ancestor: state_person
    fields:
      person_external_id: numeric_id
      alias_name: string
    primary_key: [person_external_id, alias_name]
"#;

const MANIFEST: &str = r#"
region_code: us_xx
default_encoding: utf-8
default_separator: "|"
raw_files:
  - file_tag: ofndr
    primary_key_cols: [ofndr_num]
    datetime_cols: [dob]
"#;

const MAPPING: &str = r#"
file_tag: ofndr
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
  ofndr_sname: state_person.surname
  dob: state_person.birthdate
child_key_mappings:
  alias_nm: state_person_alias.alias_name
primary_key:
  - ofndr_num
keys_to_ignore:
  - column: lan_id
    reason: staff login id, not part of any person record
  - column: updt_usr_id
    reason: audit metadata
"#;

fn fixtures() -> (FileConfig, MappingSpec, EntityCatalog) {
    let config = ManifestRegistry::from_yaml_str(MANIFEST)
        .unwrap()
        .resolve_file_config("ofndr")
        .unwrap()
        .clone();
    let mapping = MappingSpec::from_yaml_str(MAPPING).unwrap();
    let catalog = EntityCatalog::from_yaml_str(CATALOG).unwrap();
    mapping.validate(&catalog).unwrap();
    (config, mapping, catalog)
}

fn header(columns: &[&str]) -> Vec<String> {
    columns.iter().map(|c| c.to_string()).collect()
}

#[test]
fn test_header_column_not_in_mapping_fails_with_unmapped_column() {
    let (config, mapping, catalog) = fixtures();
    // lan_id IS ignored; body_loc_cd is not mentioned anywhere.
    let err = BindingSet::resolve(
        &config,
        &mapping,
        &catalog,
        &header(&["ofndr_num", "lan_id", "body_loc_cd"]),
    )
    .unwrap_err();

    match err {
        IngestError::UnmappedColumn { file_tag, column } => {
            assert_eq!(file_tag, "ofndr");
            assert_eq!(column, "body_loc_cd");
        },
        other => panic!("expected UnmappedColumn, got {other:?}"),
    }
}

#[test]
fn test_ignored_column_resolves_without_erroring() {
    let (config, mapping, catalog) = fixtures();
    let set = BindingSet::resolve(
        &config,
        &mapping,
        &catalog,
        &header(&["ofndr_num", "lan_id"]),
    )
    .unwrap();
    assert_eq!(set.binding("lan_id"), Some(&ColumnBinding::Ignored));
}

#[test]
fn test_primary_key_component_cannot_be_ignored() {
    let yaml = r#"
file_tag: ofndr
primary_entity: state_person
key_mappings:
  ofndr_num: state_person.person_external_id
primary_key: [ofndr_num]
keys_to_ignore:
  - ofndr_num
"#;
    let catalog = EntityCatalog::from_yaml_str(CATALOG).unwrap();
    let mapping = MappingSpec::from_yaml_str(yaml).unwrap();
    // Reported at load time, not at row time.
    let err = mapping.validate(&catalog).unwrap_err();
    assert!(matches!(err, IngestError::Configuration { .. }));
}

#[test]
fn test_key_binding_carries_is_key_marker() {
    let (config, mapping, catalog) = fixtures();
    let set = BindingSet::resolve(
        &config,
        &mapping,
        &catalog,
        &header(&["ofndr_num", "ofndr_sname"]),
    )
    .unwrap();

    assert_eq!(
        set.binding("ofndr_num"),
        Some(&ColumnBinding::Field {
            entity_type: "state_person".to_string(),
            field: "person_external_id".to_string(),
            is_key: true,
        })
    );
    assert_eq!(
        set.binding("ofndr_sname"),
        Some(&ColumnBinding::Field {
            entity_type: "state_person".to_string(),
            field: "surname".to_string(),
            is_key: false,
        })
    );
    assert_eq!(set.key_columns, vec!["ofndr_num"]);
}

proptest! {
    /// Any header drawn from the mapped and ignored columns resolves, and
    /// every column lands in exactly one outcome.
    #[test]
    fn prop_every_known_column_resolves_exactly_once(
        extra in proptest::sample::subsequence(
            vec!["ofndr_sname", "dob", "alias_nm", "lan_id", "updt_usr_id"],
            0..=5,
        )
    ) {
        let (config, mapping, catalog) = fixtures();
        let mut columns = vec!["ofndr_num"];
        columns.extend(extra);

        let set = BindingSet::resolve(&config, &mapping, &catalog, &header(&columns)).unwrap();
        prop_assert_eq!(set.len(), columns.len());
        for column in &columns {
            prop_assert!(set.binding(column).is_some());
        }
    }

    /// A header containing any column the mapping has never heard of always
    /// fails, naming that column.
    #[test]
    fn prop_unknown_column_always_fails(unknown in "[a-z]{3,12}_zz") {
        let (config, mapping, catalog) = fixtures();
        let err = BindingSet::resolve(
            &config,
            &mapping,
            &catalog,
            &header(&["ofndr_num", &unknown]),
        )
        .unwrap_err();
        match err {
            IngestError::UnmappedColumn { column, .. } => prop_assert_eq!(column, unknown),
            other => prop_assert!(false, "expected UnmappedColumn, got {:?}", other),
        }
    }
}
