mod common;

use sardine_insar::core::{DemSelection, SecondaryRangeTime};
use sardine_insar::{InsarParams, SarError};

#[test]
fn test_empty_config_uses_defaults() {
    common::init_logging();
    let params: InsarParams = serde_json::from_str("{}").unwrap();
    assert_eq!(params, InsarParams::default());
    assert!(params.validate().is_ok());
}

#[test]
fn test_partial_config_overrides_fields() {
    common::init_logging();
    let params: InsarParams = serde_json::from_str(
        r#"{
            "coherence_window_range": 20,
            "square_pixel": false,
            "estimation_points": 801,
            "secondary_range_time": "BistaticAverage",
            "dem": { "External": { "path": "/data/dem.tif", "no_data_value": -32768.0 } }
        }"#,
    )
    .unwrap();

    assert_eq!(params.coherence_window_range, 20);
    assert!(!params.square_pixel);
    assert_eq!(params.estimation_points, 801);
    assert_eq!(params.secondary_range_time, SecondaryRangeTime::BistaticAverage);
    assert!(matches!(params.dem, DemSelection::External { .. }));
    assert_eq!(params.flat_earth_degree, 5);
    assert!(params.validate().is_ok());

    let json = serde_json::to_string(&params).unwrap();
    let reparsed: InsarParams = serde_json::from_str(&json).unwrap();
    assert_eq!(reparsed, params);
}

#[test]
fn test_invalid_config_is_rejected_before_processing() {
    common::init_logging();
    let params: InsarParams = serde_json::from_str(r#"{ "coherence_window_azimuth": 1 }"#).unwrap();
    match params.validate() {
        Err(SarError::Validation(msg)) => assert!(msg.contains("coherence_window_azimuth")),
        other => panic!("expected validation error, got {:?}", other),
    }

    let params: InsarParams = serde_json::from_str(r#"{ "output_topo_phase": true }"#).unwrap();
    assert!(params.validate().is_err());

    let params: InsarParams = serde_json::from_str(r#"{ "output_elevation": true }"#).unwrap();
    assert!(params.validate().is_err());

    let params: InsarParams =
        serde_json::from_str(r#"{ "output_interferogram": false, "include_coherence": false }"#).unwrap();
    match params.validate() {
        Err(SarError::Validation(msg)) => assert!(msg.contains("nothing to produce")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[test]
fn test_coherence_only_config() {
    common::init_logging();
    let params: InsarParams = serde_json::from_str(
        r#"{ "output_interferogram": false, "subtract_topographic_phase": true, "output_elevation": true }"#,
    )
    .unwrap();
    assert!(!params.output_interferogram);
    assert!(params.include_coherence);
    assert!(params.validate().is_ok());
}
