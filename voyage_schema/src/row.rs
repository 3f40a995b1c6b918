use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Column names, in output order.
pub const VOYAGE_COLUMNS: [&str; 19] = [
    "port_origin",
    "port_dest",
    "lat_o",
    "lon_o",
    "lat_d",
    "lon_d",
    "gc_distance_km",
    "departure_date",
    "avg_wind_knots",
    "rain_mm",
    "temp_c",
    "max_wave_m",
    "visibility_km",
    "month",
    "season",
    "origin_queue",
    "dest_queue",
    "port_congestion_idx",
    "delay_hours",
];

/// Meteorological season code (northern-hemisphere quarters).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    #[serde(rename = "DJF")]
    Winter,
    #[serde(rename = "MAM")]
    Spring,
    #[serde(rename = "JJA")]
    Summer,
    #[serde(rename = "SON")]
    Autumn,
}

impl Season {
    /// Maps a 1-based month to its season. Out-of-range months fold into winter.
    pub fn from_month(month: u32) -> Self {
        match month {
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            9..=11 => Season::Autumn,
            _ => Season::Winter,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Season::Winter => "DJF",
            Season::Spring => "MAM",
            Season::Summer => "JJA",
            Season::Autumn => "SON",
        }
    }
}

/// One finished voyage record.
///
/// Field order matches [`VOYAGE_COLUMNS`]; serde derives the CSV header from
/// the field names, so reordering fields changes the output schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoyageRow {
    pub port_origin: String,
    pub port_dest: String,
    pub lat_o: f64,
    pub lon_o: f64,
    pub lat_d: f64,
    pub lon_d: f64,
    pub gc_distance_km: f64,
    pub departure_date: NaiveDate,
    pub avg_wind_knots: f64,
    pub rain_mm: f64,
    pub temp_c: f64,
    pub max_wave_m: f64,
    pub visibility_km: f64,
    pub month: u32,
    pub season: Season,
    pub origin_queue: u32,
    pub dest_queue: u32,
    pub port_congestion_idx: f64,
    pub delay_hours: f64,
}

impl VoyageRow {
    /// Month and season derived from a departure date.
    pub fn calendar_fields(date: NaiveDate) -> (u32, Season) {
        let month = date.month();
        (month, Season::from_month(month))
    }
}
