//! Static per-sensor band and collection table

use crate::types::{LstResult, SensorId};

/// Name of the Collection 2 pixel quality band
pub const QA_PIXEL: &str = "QA_PIXEL";

/// Band and collection layout of one Landsat sensor generation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorSpec {
    pub sensor: SensorId,
    /// Calibrated thermal bands from the top-of-atmosphere product, lowest index first
    pub thermal_bands: &'static [&'static str],
    /// Surface reflectance bands kept on harmonised scenes
    pub reflective_bands: &'static [&'static str],
    pub quality_band: &'static str,
    pub nir_band: &'static str,
    pub red_band: &'static str,
    pub toa_collection: &'static str,
    pub sr_collection: &'static str,
}

impl SensorSpec {
    /// The thermal band callers use unless told otherwise
    pub fn primary_thermal_band(&self) -> &'static str {
        self.thermal_bands[0]
    }

    /// Reflective bands plus the quality band, as selected from surface reflectance scenes
    pub fn visible_bands(&self) -> Vec<&'static str> {
        let mut bands = self.reflective_bands.to_vec();
        bands.push(self.quality_band);
        bands
    }
}

const TM_REFLECTIVE: &[&str] = &["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B7"];
const OLI_REFLECTIVE: &[&str] = &["SR_B1", "SR_B2", "SR_B3", "SR_B4", "SR_B5", "SR_B6", "SR_B7"];

static CATALOG: [SensorSpec; 5] = [
    SensorSpec {
        sensor: SensorId::L4,
        thermal_bands: &["B6"],
        reflective_bands: TM_REFLECTIVE,
        quality_band: QA_PIXEL,
        nir_band: "SR_B4",
        red_band: "SR_B3",
        toa_collection: "LANDSAT/LT04/C02/T1_TOA",
        sr_collection: "LANDSAT/LT04/C02/T1_L2",
    },
    SensorSpec {
        sensor: SensorId::L5,
        thermal_bands: &["B6"],
        reflective_bands: TM_REFLECTIVE,
        quality_band: QA_PIXEL,
        nir_band: "SR_B4",
        red_band: "SR_B3",
        toa_collection: "LANDSAT/LT05/C02/T1_TOA",
        sr_collection: "LANDSAT/LT05/C02/T1_L2",
    },
    SensorSpec {
        sensor: SensorId::L7,
        thermal_bands: &["B6_VCID_1", "B6_VCID_2"],
        reflective_bands: TM_REFLECTIVE,
        quality_band: QA_PIXEL,
        nir_band: "SR_B4",
        red_band: "SR_B3",
        toa_collection: "LANDSAT/LE07/C02/T1_TOA",
        sr_collection: "LANDSAT/LE07/C02/T1_L2",
    },
    SensorSpec {
        sensor: SensorId::L8,
        thermal_bands: &["B10"],
        reflective_bands: OLI_REFLECTIVE,
        quality_band: QA_PIXEL,
        nir_band: "SR_B5",
        red_band: "SR_B4",
        toa_collection: "LANDSAT/LC08/C02/T1_TOA",
        sr_collection: "LANDSAT/LC08/C02/T1_L2",
    },
    SensorSpec {
        sensor: SensorId::L9,
        thermal_bands: &["B10"],
        reflective_bands: OLI_REFLECTIVE,
        quality_band: QA_PIXEL,
        nir_band: "SR_B5",
        red_band: "SR_B4",
        toa_collection: "LANDSAT/LC09/C02/T1_TOA",
        sr_collection: "LANDSAT/LC09/C02/T1_L2",
    },
];

/// Catalog entry for a sensor
pub fn spec_for(sensor: SensorId) -> &'static SensorSpec {
    match sensor {
        SensorId::L4 => &CATALOG[0],
        SensorId::L5 => &CATALOG[1],
        SensorId::L7 => &CATALOG[2],
        SensorId::L8 => &CATALOG[3],
        SensorId::L9 => &CATALOG[4],
    }
}

/// Look up a sensor by its configuration id ("L8"); unknown ids fail with `UnknownSensor`
pub fn lookup(sensor_id: &str) -> LstResult<&'static SensorSpec> {
    let sensor: SensorId = sensor_id.parse()?;
    Ok(spec_for(sensor))
}

/// All supported sensors in generation order
pub fn all() -> &'static [SensorSpec] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::LstError;

    #[test]
    fn test_lookup_newer_sensors_use_shifted_bands() {
        let l8 = lookup("L8").unwrap();
        assert_eq!((l8.nir_band, l8.red_band), ("SR_B5", "SR_B4"));
        assert_eq!(l8.thermal_bands, &["B10"]);
        assert_eq!(l8.sr_collection, "LANDSAT/LC08/C02/T1_L2");

        let l5 = lookup("L5").unwrap();
        assert_eq!((l5.nir_band, l5.red_band), ("SR_B4", "SR_B3"));
        assert_eq!(l5.toa_collection, "LANDSAT/LT05/C02/T1_TOA");
    }

    #[test]
    fn test_l7_picks_lowest_gain_band_first() {
        let l7 = lookup("L7").unwrap();
        assert_eq!(l7.thermal_bands.len(), 2);
        assert_eq!(l7.primary_thermal_band(), "B6_VCID_1");
    }

    #[test]
    fn test_unknown_sensor_fails() {
        assert!(matches!(lookup("L6"), Err(LstError::UnknownSensor(_))));
        assert!(matches!(lookup(""), Err(LstError::UnknownSensor(_))));
    }

    #[test]
    fn test_catalog_is_ordered_by_sensor() {
        for (spec, sensor) in all().iter().zip(SensorId::ALL.iter()) {
            assert_eq!(spec.sensor, *sensor);
            assert_eq!(spec_for(*sensor), spec);
            assert_eq!(spec.visible_bands().last(), Some(&QA_PIXEL));
        }
    }
}
