/// Country and world-region tagging for catalog stations.
///
/// The station catalog carries no country. A [`Geocoder`] resolves each
/// station to an ISO 3166-1 alpha-2 code, and the table below maps the
/// code to a UN-style sub-region name. Candidate selection filters on the
/// country code, so this runs after every catalog load.

use crate::model::Station;
use crate::store::{SinkError, StationStore};

/// Sub-regions and their member countries. A code listed under two
/// regions resolves to the first.
pub const REGIONS: &[(&str, &[&str])] = &[
    // Asia
    ("southern_asia", &["AF", "BD", "BT", "IN", "IR", "LK", "MV", "NP", "PK"]),
    ("western_asia", &["AE", "AM", "AZ", "BH", "CY", "GE", "IQ", "IL", "JO", "KW", "LB", "OM", "PS", "QA", "SA", "SY", "TR", "YE"]),
    ("southeastern_asia", &["BN", "ID", "KH", "LA", "MM", "MY", "PH", "SG", "TH", "VN", "TL"]),
    ("eastern_asia", &["CN", "HK", "JP", "KR", "MO", "MN", "KP", "TW"]),
    ("central_asia", &["KZ", "KG", "TJ", "TM", "UZ"]),
    // Africa
    ("middle_africa", &["AO", "CF", "CM", "CG", "GA", "GQ", "ST", "TD", "CD"]),
    ("eastern_africa", &["BI", "KM", "DJ", "ER", "ET", "KE", "MG", "MZ", "MU", "MW", "RE", "RW", "SO", "SC", "TZ", "UG", "ZM", "ZW", "YT", "TF", "IO"]),
    ("western_africa", &["BJ", "BF", "CI", "CV", "GH", "GN", "GM", "GW", "LR", "ML", "MR", "NE", "NG", "SN", "SH", "SL", "TG"]),
    ("southern_africa", &["BW", "LS", "NA", "SZ", "ZA"]),
    ("northern_africa", &["DZ", "EG", "EH", "LY", "MA", "SD", "TN", "SS"]),
    // Americas
    ("caribbean", &["AI", "CW", "AG", "BS", "BB", "CU", "KY", "DM", "DO", "GP", "GD", "HT", "JM", "KN", "LC", "MS", "MQ", "PR", "TC", "TT", "VC", "VG", "VI", "AW", "BQ", "BL", "MF", "SX"]),
    ("south_america", &["AR", "BO", "BR", "CL", "CO", "EC", "FK", "GF", "GY", "PE", "PY", "SR", "UY", "VE", "BV", "GS"]),
    ("central_america", &["BZ", "CR", "GT", "HN", "MX", "NI", "PA", "SV"]),
    ("northern_america", &["BM", "CA", "GL", "PM", "US"]),
    // Europe
    ("southern_europe", &["AL", "AD", "PT", "BA", "ES", "GI", "GR", "HR", "IT", "MK", "MT", "SM", "RS", "SI", "VA", "ME"]),
    ("western_europe", &["AT", "BE", "CH", "DE", "FR", "LI", "LU", "MC", "NL"]),
    ("eastern_europe", &["BG", "BY", "CZ", "HU", "MD", "PL", "RO", "RU", "SK", "UA"]),
    ("northern_europe", &["DK", "EE", "FI", "FO", "GB", "IE", "IS", "LT", "LV", "IM", "NO", "SE", "SJ", "AX", "GG", "JE"]),
    ("russian_federation", &["RU"]),
    // Oceania
    ("polynesia", &["AS", "CK", "NU", "PN", "PF", "TK", "TO", "TV", "WF", "WS"]),
    ("australia_new_zealand", &["AU", "NZ", "NF", "CC", "CX", "HM"]),
    ("melanesia", &["FJ", "NC", "PG", "SB", "VU"]),
    ("micronesia", &["FM", "GU", "KI", "MH", "NR", "PW", "MP", "UM"]),
    // Antarctica
    ("antarctica", &["AQ"]),
];

/// Sub-region for an ISO alpha-2 country code.
pub fn region_for_country(country_code: &str) -> Option<&'static str> {
    REGIONS
        .iter()
        .find(|(_, codes)| codes.contains(&country_code))
        .map(|(region, _)| *region)
}

/// Resolves a station to an ISO alpha-2 country code.
pub trait Geocoder {
    fn country_code(&mut self, station: &Station) -> Option<String>;
}

/// GHCND station ids embed a FIPS 10-4 country code after the dataset
/// prefix: `GHCND:USW00094728` is in the US. FIPS and ISO agree for the
/// US itself but not for most territories, so only codes listed here
/// resolve.
///
/// The table covers North America and the US territories only. Stations
/// anywhere else stay untagged (no country, no region) and are never
/// candidates; tagging a worldwide catalog needs a coordinate-based
/// [`Geocoder`].
pub struct GhcndIdGeocoder;

const FIPS_TO_ISO: &[(&str, &str)] = &[
    ("US", "US"),
    ("CA", "CA"),
    ("MX", "MX"),
    ("RQ", "PR"),
    ("VQ", "VI"),
    ("GQ", "GU"),
    ("AQ", "AS"),
    ("CQ", "MP"),
    ("BD", "BM"),
    ("GL", "GL"),
];

impl Geocoder for GhcndIdGeocoder {
    fn country_code(&mut self, station: &Station) -> Option<String> {
        let local = station.station_id.strip_prefix("GHCND:")?;
        let fips = local.get(..2)?;
        FIPS_TO_ISO
            .iter()
            .find(|(code, _)| *code == fips)
            .map(|(_, iso)| iso.to_string())
    }
}

/// Counts from one [`assign_regions`] pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegionSummary {
    pub updated: usize,
    /// Stored with a country but no region.
    pub unknown_region: usize,
    /// Left untouched because the geocoder had no answer.
    pub ungeocoded: usize,
}

/// Tags every station without a country code.
pub fn assign_regions<S, G>(store: &mut S, geocoder: &mut G) -> Result<RegionSummary, SinkError>
where
    S: StationStore,
    G: Geocoder,
{
    let stations = store.stations_without_country()?;
    log::info!("Stations without country code: {}", stations.len());

    let mut summary = RegionSummary::default();
    for station in &stations {
        let Some(country_code) = geocoder.country_code(station) else {
            log::warn!(station = station.station_id.as_str(); "No country found for station");
            summary.ungeocoded += 1;
            continue;
        };

        let region = region_for_country(&country_code);
        if region.is_none() {
            log::warn!("Could not determine region for {}", country_code);
            summary.unknown_region += 1;
        }

        store.set_station_region(&station.station_id, &country_code, region)?;
        summary.updated += 1;
    }

    log::info!("Country codes and regions update complete");
    Ok(summary)
}
