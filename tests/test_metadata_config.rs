mod common;

use approx::assert_relative_eq;
use common::*;
use landsat_lst::core::{EmissivityMethod, SceneFilter, StatType};
use landsat_lst::io::{LandsatArchive, MtlParser, ProductId, RunConfig};
use landsat_lst::{LstError, Region, SensorId, TimePeriod};
use std::fs;
use std::path::Path;

fn mtl(product_id: &str, spacecraft: &str, date_acquired: &str, cloud_cover: f64) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<LANDSAT_METADATA_FILE>
  <PRODUCT_CONTENTS>
    <LANDSAT_PRODUCT_ID>{id}</LANDSAT_PRODUCT_ID>
    <FILE_NAME_BAND_4>{id}_SR_B4.TIF</FILE_NAME_BAND_4>
    <FILE_NAME_BAND_5>{id}_SR_B5.TIF</FILE_NAME_BAND_5>
    <FILE_NAME_QUALITY_L1_PIXEL>{id}_QA_PIXEL.TIF</FILE_NAME_QUALITY_L1_PIXEL>
  </PRODUCT_CONTENTS>
  <IMAGE_ATTRIBUTES>
    <SPACECRAFT_ID>{spacecraft}</SPACECRAFT_ID>
    <WRS_PATH>122</WRS_PATH>
    <WRS_ROW>44</WRS_ROW>
    <DATE_ACQUIRED>{date}</DATE_ACQUIRED>
    <SCENE_CENTER_TIME>"02:51:07.1234560Z"</SCENE_CENTER_TIME>
    <CLOUD_COVER>{cloud}</CLOUD_COVER>
  </IMAGE_ATTRIBUTES>
  <PROJECTION_ATTRIBUTES>
    <GRID_CELL_SIZE_REFLECTIVE>30.00</GRID_CELL_SIZE_REFLECTIVE>
    <CORNER_UL_PROJECTION_X_PRODUCT>500000.000</CORNER_UL_PROJECTION_X_PRODUCT>
    <CORNER_UL_PROJECTION_Y_PRODUCT>4000000.000</CORNER_UL_PROJECTION_Y_PRODUCT>
    <CORNER_UR_PROJECTION_X_PRODUCT>530000.000</CORNER_UR_PROJECTION_X_PRODUCT>
    <CORNER_UR_PROJECTION_Y_PRODUCT>4000000.000</CORNER_UR_PROJECTION_Y_PRODUCT>
    <CORNER_LL_PROJECTION_X_PRODUCT>500000.000</CORNER_LL_PROJECTION_X_PRODUCT>
    <CORNER_LL_PROJECTION_Y_PRODUCT>3970000.000</CORNER_LL_PROJECTION_Y_PRODUCT>
    <CORNER_LR_PROJECTION_X_PRODUCT>530000.000</CORNER_LR_PROJECTION_X_PRODUCT>
    <CORNER_LR_PROJECTION_Y_PRODUCT>3970000.000</CORNER_LR_PROJECTION_Y_PRODUCT>
  </PROJECTION_ATTRIBUTES>
</LANDSAT_METADATA_FILE>"#,
        id = product_id,
        spacecraft = spacecraft,
        date = date_acquired,
        cloud = cloud_cover
    )
}

fn write_mtl(root: &Path, product_id: &str, content: &str) {
    let folder = root.join(product_id);
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join(format!("{}_MTL.xml", product_id)), content).unwrap();
}

#[test]
fn test_level2_mtl_to_scene_metadata() {
    init_logging();

    let id = "LC09_L2SP_122044_20230704_20230706_02_T1";
    let doc = MtlParser::parse_mtl(&mtl(id, "LANDSAT_9", "2023-07-04", 3.5)).unwrap();
    let md = doc.to_scene_metadata().unwrap();
    assert_eq!(md.sensor, SensorId::L9);
    assert_eq!(md.scene_id, "LC09_122044_20230704");
    assert_eq!(md.scene_center_time(), "02:51:07.123456Z");
    assert_relative_eq!(md.cloud_cover, 3.5);
    assert_eq!(md.sun_azimuth, None);

    let bands: Vec<String> = doc.band_files().into_keys().collect();
    assert_eq!(bands, vec!["QA_PIXEL", "SR_B4", "SR_B5"]);

    let product: ProductId = id.parse().unwrap();
    assert!(product.level.is_level2());
}

#[test]
fn test_spacecraft_must_match_product() {
    let doc = MtlParser::parse_mtl(&mtl("LC08_L2SP_122044_20230704_20230706_02_T1", "LANDSAT_9", "2023-07-04", 1.0))
        .unwrap();
    assert!(matches!(doc.to_scene_metadata(), Err(LstError::Metadata(_))));
}

#[test]
fn test_archive_scan_and_selection() {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let products = [
        ("LT05_L2SP_122044_20030611_20200905_02_T1", "LANDSAT_5", "2003-06-11", 10.0),
        ("LT05_L1TP_122044_20030611_20200905_02_T1", "LANDSAT_5", "2003-06-11", 10.0),
        ("LE07_L2SP_122044_20030619_20200915_02_T1", "LANDSAT_7", "2003-06-19", 95.0),
        ("LT05_L2SP_122044_20030829_20200905_02_T1", "LANDSAT_5", "2003-08-29", 20.0),
    ];
    for (id, spacecraft, day, cloud) in products {
        write_mtl(dir.path(), id, &mtl(id, spacecraft, day, cloud));
    }

    let archive = LandsatArchive::scan(dir.path()).unwrap();
    assert_eq!(archive.len(), 4);

    let filter = SceneFilter::new(TimePeriod::new(date(2003, 6, 1), date(2003, 7, 1)), Region::unbounded("all"));
    let sr = archive.select("LANDSAT/LT05/C02/T1_L2", &filter).unwrap();
    assert_eq!(sr.len(), 1);
    let toa = archive.select("LANDSAT/LT05/C02/T1_TOA", &filter).unwrap();
    assert_eq!(toa[0].metadata.scene_id, sr[0].metadata.scene_id);
    assert_eq!(archive.select("LANDSAT/LE07/C02/T1_L2", &filter).unwrap().len(), 1);
}

const BOUNDARIES: &str = r#"{
    "type": "FeatureCollection",
    "features": [
        {"type": "Feature", "properties": {"name": "Guangzhou"},
         "geometry": {"type": "Polygon", "coordinates": [[[500000, 3970000], [530000, 3970000], [530000, 4000000], [500000, 4000000], [500000, 3970000]]]}},
        {"type": "Feature", "properties": {"name": "Foshan"},
         "geometry": {"type": "Polygon", "coordinates": [[[0, 0], [1, 0], [1, 1], [0, 0]]]}}
    ]
}"#;

fn admin_config(boundaries: &Path, extra: &str) -> String {
    format!(
        r#"{{
            "periods": [{{"start": "2020-01-01", "end": "2021-01-01"}}],
            "region": {{"admin": {{"level": "city", "name": "Guangzhou", "custom_name": "gz",
                                   "boundaries": "{}"}}}},
            "satellites": {{"L8": true, "L9": true, "L7": false}}{}
        }}"#,
        boundaries.display().to_string().replace('\\', "\\\\"),
        extra
    )
}

#[test]
fn test_admin_region_config() {
    init_logging();

    let dir = tempfile::tempdir().unwrap();
    let boundaries = dir.path().join("cities.geojson");
    fs::write(&boundaries, BOUNDARIES).unwrap();
    let config_path = dir.path().join("run.json");
    fs::write(&config_path, admin_config(&boundaries, r#", "method": "aster", "stat_type": "max""#)).unwrap();

    let settings = RunConfig::load(&config_path).unwrap().validate().unwrap();
    assert_eq!(settings.region_label, "city_gz");
    assert_eq!(settings.region.name, "Guangzhou");
    assert!(settings.region.contains(515000.0, 3985000.0));
    assert_eq!(settings.sensors, vec![SensorId::L8, SensorId::L9]);
    assert_eq!(settings.emissivity_method, EmissivityMethod::Aster);
    assert_eq!(settings.stat_type(), StatType::Max);
    assert!(settings
        .output_name(&settings.periods[0])
        .starts_with("city_gz_20200101_20210101_cloud_0_100_LST_max_A"));
}

#[test]
fn test_config_errors_fail_before_processing() {
    let dir = tempfile::tempdir().unwrap();
    let boundaries = dir.path().join("cities.geojson");
    fs::write(&boundaries, BOUNDARIES).unwrap();

    let bad_method = RunConfig::from_json(&admin_config(&boundaries, r#", "method": "lookup""#)).unwrap();
    assert!(matches!(bad_method.validate(), Err(LstError::InvalidEmissivityMethod(_))));

    let bad_histogram =
        RunConfig::from_json(&admin_config(&boundaries, r#", "histogram": {"min": 10, "max": 0, "width": 2}"#))
            .unwrap();
    assert!(matches!(bad_histogram.validate(), Err(LstError::Config(_))));

    let missing_file = RunConfig::from_json(&admin_config(&dir.path().join("nope.geojson"), "")).unwrap();
    assert!(matches!(missing_file.validate(), Err(LstError::Io(_))));

    assert!(matches!(RunConfig::from_json("{\"periods\": 3}"), Err(LstError::Json(_))));
}
