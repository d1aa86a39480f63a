use autolevel_settings::{Config, SettingsError};
use tempfile::tempdir;

#[test]
fn toml_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut config = Config::new();
    config.connection.cnc_port = Some("/dev/ttyUSB0".to_string());
    config.connection.switch_port = Some("/dev/ttyACM0".to_string());
    config.probing.max_probe_steps = Some(300);
    config.contour.target_z_depth = 0.15;

    config.save_to_file(&path).unwrap();
    let loaded = Config::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn json_round_trip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");

    let mut config = Config::new();
    config.probing.samples = 4;
    config.connection.discard_stale_input = false;

    config.save_to_file(&path).unwrap();
    assert_eq!(Config::load_from_file(&path).unwrap(), config);
}

#[test]
fn unsupported_extension_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.yaml");

    assert!(matches!(
        Config::new().save_to_file(&path),
        Err(SettingsError::UnsupportedFormat(ext)) if ext == "yaml"
    ));
}

#[test]
fn invalid_file_is_not_loaded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[connection]\nread_timeout_ms = 0\n").unwrap();

    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::InvalidSetting { .. })
    ));

    std::fs::write(&path, "[connection\n").unwrap();
    assert!(matches!(
        Config::load_from_file(&path),
        Err(SettingsError::TomlError(_))
    ));
}

#[test]
fn default_path_is_under_autolevel() {
    if let Ok(path) = Config::default_path() {
        assert!(path.ends_with("autolevel/config.toml"));
    }
}
