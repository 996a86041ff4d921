//! Landsat Collection 2 product identifiers

use crate::types::{LstError, LstResult, SensorId};
use chrono::NaiveDate;
use regex::Regex;
use std::fmt;
use std::str::FromStr;

/// Processing level of a product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingLevel {
    /// Level-1 precision terrain (top of atmosphere)
    L1TP,
    L1GT,
    L1GS,
    /// Level-2 science product (surface reflectance and temperature)
    L2SP,
    /// Level-2 surface reflectance only
    L2SR,
}

impl ProcessingLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingLevel::L1TP => "L1TP",
            ProcessingLevel::L1GT => "L1GT",
            ProcessingLevel::L1GS => "L1GS",
            ProcessingLevel::L2SP => "L2SP",
            ProcessingLevel::L2SR => "L2SR",
        }
    }

    pub fn is_level2(&self) -> bool {
        matches!(self, ProcessingLevel::L2SP | ProcessingLevel::L2SR)
    }
}

impl FromStr for ProcessingLevel {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "L1TP" => Ok(ProcessingLevel::L1TP),
            "L1GT" => Ok(ProcessingLevel::L1GT),
            "L1GS" => Ok(ProcessingLevel::L1GS),
            "L2SP" => Ok(ProcessingLevel::L2SP),
            "L2SR" => Ok(ProcessingLevel::L2SR),
            other => Err(LstError::InvalidFormat(format!("unknown processing level {}", other))),
        }
    }
}

/// Parsed `LC08_L2SP_123032_20200101_20200115_02_T1`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductId {
    pub sensor: SensorId,
    pub level: ProcessingLevel,
    pub wrs_path: u32,
    pub wrs_row: u32,
    pub acquired: NaiveDate,
    pub processed: NaiveDate,
    pub collection: u8,
    /// Tier: "T1", "T2" or "RT"
    pub tier: String,
}

fn product_pattern() -> LstResult<Regex> {
    Regex::new(r"^(L[CETOM]0[4-9])_(L[12][A-Z]{2})_(\d{3})(\d{3})_(\d{8})_(\d{8})_(\d{2})_(T1|T2|RT)$")
        .map_err(|e| LstError::Processing(format!("Regex error: {}", e)))
}

fn parse_date(value: &str) -> LstResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y%m%d")
        .map_err(|e| LstError::InvalidFormat(format!("invalid product date {}: {}", value, e)))
}

impl ProductId {
    pub fn parse(product_id: &str) -> LstResult<Self> {
        let pattern = product_pattern()?;
        let captures = pattern
            .captures(product_id.trim())
            .ok_or_else(|| LstError::InvalidFormat(format!("not a Collection 2 product id: {}", product_id)))?;

        // All groups are mandatory in the pattern
        let group = |i: usize| captures.get(i).map_or("", |m| m.as_str());
        let number = |i: usize| {
            group(i)
                .parse::<u32>()
                .map_err(|e| LstError::InvalidFormat(format!("{}: {}", product_id, e)))
        };

        Ok(Self {
            sensor: SensorId::from_product_code(group(1))?,
            level: group(2).parse()?,
            wrs_path: number(3)?,
            wrs_row: number(4)?,
            acquired: parse_date(group(5))?,
            processed: parse_date(group(6))?,
            collection: number(7)? as u8,
            tier: group(8).to_string(),
        })
    }

    /// Key shared by the Level-1 and Level-2 products of one acquisition
    /// ("LC08_123032_20200101")
    pub fn scene_key(&self) -> String {
        format!(
            "{}_{:03}{:03}_{}",
            self.sensor.product_code(),
            self.wrs_path,
            self.wrs_row,
            self.acquired.format("%Y%m%d")
        )
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{:03}{:03}_{}_{}_{:02}_{}",
            self.sensor.product_code(),
            self.level.as_str(),
            self.wrs_path,
            self.wrs_row,
            self.acquired.format("%Y%m%d"),
            self.processed.format("%Y%m%d"),
            self.collection,
            self.tier
        )
    }
}

impl FromStr for ProductId {
    type Err = LstError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProductId::parse(s)
    }
}
