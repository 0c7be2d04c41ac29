use spatio_live::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

#[test]
fn test_load_config_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
default_precision = 7
distance_tolerance_km = 0.001
emit_metadata = false
"#
    )
    .unwrap();

    let config = Config::from_file(file.path()).unwrap();
    assert_eq!(config.default_precision, 7);
    assert_eq!(config.distance_tolerance_km, 0.001);
    assert!(!config.emit_metadata);
    assert!(config.suppress_duplicate_emissions);

    let geo = GeoClientBuilder::new()
        .config(config)
        .build(MemoryStore::new())
        .unwrap();
    assert_eq!(geo.point(40.5, -80.0).unwrap().hash().len(), 7);
}

#[test]
fn test_config_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("geo.toml");

    let config = Config::default()
        .with_default_precision(10)
        .with_suppress_duplicate_emissions(false);
    std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();

    assert_eq!(Config::from_file(&path).unwrap(), config);
}

#[test]
fn test_empty_file_uses_defaults() {
    let file = NamedTempFile::new().unwrap();
    assert_eq!(Config::from_file(file.path()).unwrap(), Config::default());
}

#[test]
fn test_invalid_config_files() {
    assert!(matches!(
        Config::from_toml_str("default_precision = 13"),
        Err(GeoError::Config(_))
    ));
    assert!(matches!(
        Config::from_toml_str("unknown_key = 1"),
        Err(GeoError::TomlDe(_))
    ));
    assert!(matches!(
        Config::from_file("/nonexistent/geo.toml"),
        Err(GeoError::Io(_))
    ));
}
