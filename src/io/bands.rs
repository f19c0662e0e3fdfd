use crate::types::{Polarization, SarError, SarResult};
use chrono::NaiveDate;
use regex::Regex;
use std::collections::BTreeMap;

const BAND_NAME_PATTERN: &str = r"^(?P<comp>[iq])_(?:(?P<swath>(?:IW|EW)\d)_)?(?:(?P<pol>HH|HV|VH|VV)_)?(?P<role>mst|slv\d*)_(?P<date>\d{2}[A-Za-z]{3}\d{4})$";

/// Date format used in band names, e.g. `03Jan2020`
pub const BAND_DATE_FORMAT: &str = "%d%b%Y";

/// Which image of the stack a band belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageRole {
    Master,
    /// `slv`, `slv1`, `slv2`, ...
    Secondary(String),
}

impl std::fmt::Display for ImageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageRole::Master => write!(f, "mst"),
            ImageRole::Secondary(tag) => write!(f, "{}", tag),
        }
    }
}

/// Real/imaginary band pair of one complex image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexBandRef {
    pub real: String,
    pub imag: String,
    pub role: ImageRole,
    pub sub_swath: Option<String>,
    pub polarization: Option<Polarization>,
    pub date: NaiveDate,
}

impl ComplexBandRef {
    /// Acquisition date as written in band names
    pub fn date_tag(&self) -> String {
        self.date.format(BAND_DATE_FORMAT).to_string()
    }

    /// Sub-swath number, e.g. 2 for `IW2`
    pub fn sub_swath_index(&self) -> Option<usize> {
        self.sub_swath
            .as_ref()
            .and_then(|s| s.get(2..))
            .and_then(|digits| digits.parse().ok())
    }
}

/// Master and secondary band references of one interferometric pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandPair {
    pub master: ComplexBandRef,
    pub secondary: ComplexBandRef,
}

impl BandPair {
    /// Output band suffix `_<swath>_<pol>_<masterDate>_<secondaryDate>`
    pub fn suffix(&self) -> String {
        let mut suffix = String::new();
        if let Some(sw) = &self.master.sub_swath {
            suffix.push('_');
            suffix.push_str(sw);
        }
        if let Some(pol) = self.master.polarization {
            suffix.push_str(&format!("_{}", pol));
        }
        suffix.push_str(&format!("_{}_{}", self.master.date_tag(), self.secondary.date_tag()));
        suffix
    }
}

type GroupKey = (ImageRole, Option<String>, Option<Polarization>, NaiveDate);

#[derive(Default)]
struct Components {
    real: Option<String>,
    imag: Option<String>,
}

/// Validated mapping from complex images to their real/imaginary bands
#[derive(Debug, Clone)]
pub struct BandCatalog {
    images: Vec<ComplexBandRef>,
}

impl BandCatalog {
    /// Parse band names; names that do not describe a complex component are ignored.
    pub fn from_band_names<I, S>(names: I) -> SarResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let pattern = Regex::new(BAND_NAME_PATTERN)
            .map_err(|e| SarError::Processing(format!("invalid band name pattern: {}", e)))?;

        let mut groups: BTreeMap<GroupKey, Components> = BTreeMap::new();
        for name in names {
            let name = name.as_ref();
            let caps = match pattern.captures(name) {
                Some(caps) => caps,
                None => {
                    log::debug!("Ignoring band {}", name);
                    continue;
                }
            };

            let date_text = &caps["date"];
            let date = NaiveDate::parse_from_str(date_text, BAND_DATE_FORMAT).map_err(|e| {
                SarError::Validation(format!("band {}: invalid acquisition date {}: {}", name, date_text, e))
            })?;
            let polarization = caps
                .name("pol")
                .map(|m| m.as_str().parse::<Polarization>())
                .transpose()?;
            let sub_swath = caps.name("swath").map(|m| m.as_str().to_string());
            let role = match &caps["role"] {
                "mst" => ImageRole::Master,
                tag => ImageRole::Secondary(tag.to_string()),
            };

            let entry = groups.entry((role, sub_swath, polarization, date)).or_default();
            let slot = if &caps["comp"] == "i" {
                &mut entry.real
            } else {
                &mut entry.imag
            };
            if let Some(existing) = slot.as_ref() {
                return Err(SarError::Validation(format!(
                    "bands {} and {} describe the same complex component",
                    existing, name
                )));
            }
            *slot = Some(name.to_string());
        }

        let mut images = Vec::with_capacity(groups.len());
        for ((role, sub_swath, polarization, date), components) in groups {
            let describe = || {
                format!(
                    "{} {} {} {}",
                    role,
                    sub_swath.as_deref().unwrap_or("-"),
                    polarization.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string()),
                    date.format(BAND_DATE_FORMAT)
                )
            };
            let real = components.real.ok_or_else(|| {
                SarError::Validation(format!("missing real (i_) band for {}", describe()))
            })?;
            let imag = components.imag.ok_or_else(|| {
                SarError::Validation(format!("missing imaginary (q_) band for {}", describe()))
            })?;
            images.push(ComplexBandRef {
                real,
                imag,
                role,
                sub_swath,
                polarization,
                date,
            });
        }

        log::debug!("Band catalog holds {} complex images", images.len());
        Ok(Self { images })
    }

    pub fn images(&self) -> &[ComplexBandRef] {
        &self.images
    }

    /// Master x secondary pairs sharing sub-swath and polarization
    pub fn pairs(&self) -> SarResult<Vec<BandPair>> {
        let masters: Vec<&ComplexBandRef> = self
            .images
            .iter()
            .filter(|b| b.role == ImageRole::Master)
            .collect();

        for (i, a) in masters.iter().enumerate() {
            if masters[i + 1..]
                .iter()
                .any(|b| b.sub_swath == a.sub_swath && b.polarization == a.polarization)
            {
                return Err(SarError::Validation(format!(
                    "more than one master image for sub-swath {:?}, polarization {:?}",
                    a.sub_swath, a.polarization
                )));
            }
        }

        let mut pairs = Vec::new();
        for master in &masters {
            for secondary in self.images.iter().filter(|b| {
                b.role != ImageRole::Master
                    && b.sub_swath == master.sub_swath
                    && b.polarization == master.polarization
            }) {
                pairs.push(BandPair {
                    master: (*master).clone(),
                    secondary: secondary.clone(),
                });
            }
        }

        if pairs.is_empty() {
            return Err(SarError::Validation(
                "no master/secondary complex band pairs found".to_string(),
            ));
        }
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sub_swath_index() {
        let catalog = BandCatalog::from_band_names([
            "i_IW2_VV_mst_03Jan2020",
            "q_IW2_VV_mst_03Jan2020",
        ])
        .unwrap();
        assert_eq!(catalog.images()[0].sub_swath_index(), Some(2));
        assert_eq!(catalog.images()[0].date_tag(), "03Jan2020");
    }

    #[test]
    fn test_duplicate_component_rejected() {
        let result = BandCatalog::from_band_names(["i_mst_03Jan2020", "i_mst_03Jan2020"]);
        assert!(matches!(result, Err(SarError::Validation(_))));
    }

    #[test]
    fn test_bad_date_rejected() {
        let result = BandCatalog::from_band_names(["i_mst_32Jan2020", "q_mst_32Jan2020"]);
        assert!(matches!(result, Err(SarError::Validation(_))));
    }
}
