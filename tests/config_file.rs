use violation_parse::config::{CliOverrides, ConfigLoader};
use violation_parse::models::ChannelOrder;

#[test]
fn generated_config_loads_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("violation-parse.ini");
    ConfigLoader::create_default_config(&path).unwrap();

    let config = ConfigLoader::load(Some(&path), &CliOverrides::default()).unwrap();
    assert_eq!(config.analysis.window_length, 50);
    assert_eq!(config.analysis.stride, 10);
    assert_eq!(config.analysis.min_confidence, 0.5);
    assert_eq!(
        config.analysis.categories,
        vec!["신호위반", "중앙선침범", "진로변경위반"]
    );
    assert_eq!(config.analysis.min_plate_votes, 2);
    assert_eq!(config.models.classifier_channel_order, ChannelOrder::Bgr);
    assert!(config.models.object_labels.is_none());
    assert!(config.ocr.engines.is_empty());
    assert!(config.forwarding.enabled);
}

#[test]
fn command_line_wins_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("custom.ini");
    std::fs::write(
        &path,
        "[analysis]\n\
         min_confidence = 0.6\n\
         location = 강남대로\n\
         [ocr]\n\
         engines = paddle=http://ocr-1:8866/ocr, easy=http://ocr-2:8867/ocr\n\
         [forwarding]\n\
         url = http://records:9000/api/violations\n",
    )
    .unwrap();

    let config = ConfigLoader::load(Some(&path), &CliOverrides::default()).unwrap();
    assert_eq!(config.analysis.min_confidence, 0.6);
    assert_eq!(config.analysis.location, "강남대로");
    assert_eq!(config.ocr.engines.len(), 2);
    assert_eq!(config.ocr.engines[1].0, "easy");
    assert_eq!(config.forwarding.url, "http://records:9000/api/violations");

    let cli = CliOverrides {
        min_confidence: Some(0.8),
        location: Some("테헤란로".to_string()),
        forward_url: Some("http://localhost:8080/api/violations".to_string()),
        ..CliOverrides::default()
    };
    let config = ConfigLoader::load(Some(&path), &cli).unwrap();
    assert_eq!(config.analysis.min_confidence, 0.8);
    assert_eq!(config.analysis.location, "테헤란로");
    assert_eq!(config.forwarding.url, "http://localhost:8080/api/violations");
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.ini");
    assert!(ConfigLoader::load(Some(&missing), &CliOverrides::default()).is_err());
}
