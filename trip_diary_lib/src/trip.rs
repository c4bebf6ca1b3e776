use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::coordinate::Coordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransportMode {
    Walk,
    Cycle,
    Car,
    Bus,
    Train,
    #[serde(rename = "Auto-rickshaw")]
    Auto,
    Taxi,
    Motorbike,
}

impl TransportMode {
    pub const ALL: [TransportMode; 8] = [
        TransportMode::Walk,
        TransportMode::Cycle,
        TransportMode::Car,
        TransportMode::Bus,
        TransportMode::Train,
        TransportMode::Auto,
        TransportMode::Taxi,
        TransportMode::Motorbike,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TransportMode::Walk => "Walk",
            TransportMode::Cycle => "Cycle",
            TransportMode::Car => "Car",
            TransportMode::Bus => "Bus",
            TransportMode::Train => "Train",
            TransportMode::Auto => "Auto-rickshaw",
            TransportMode::Taxi => "Taxi",
            TransportMode::Motorbike => "Motorbike",
        }
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for TransportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        if wanted == "auto" || wanted == "rickshaw" {
            return Ok(TransportMode::Auto);
        }

        TransportMode::ALL
            .into_iter()
            .find(|mode| mode.label().to_lowercase() == wanted)
            .ok_or_else(|| {
                let known: Vec<&str> = TransportMode::ALL.iter().map(|mode| mode.label()).collect();
                format!("Unknown transport mode '{}', expected one of: {}", s, known.join(", "))
            })
    }
}

/// A completed trip. Never edited after it is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trip {
    pub id: i64,
    pub origin: String,
    pub destination: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub start_coords: Coordinate,
    pub end_coords: Coordinate,
    pub mode: TransportMode,
    pub companions: u32,
    /// Kilometers along `path`
    pub distance: f64,
    pub path: Vec<Coordinate>,
}

impl Trip {
    /// Rounded to the nearest minute, halves upward. Negative when the clock
    /// went backwards during the trip.
    pub fn duration_minutes(&self) -> i64 {
        (self.end_time - self.start_time)
            .num_milliseconds()
            .saturating_add(30_000)
            .div_euclid(60_000)
    }

    pub fn summary(&self) -> String {
        let mut line = format!(
            "{} {} | {} ({}) -> {} ({}) | {} min, {:.2} km",
            self.start_time.format("%Y-%m-%d"),
            self.mode,
            self.origin,
            self.start_time.format("%H:%M"),
            self.destination,
            self.end_time.format("%H:%M"),
            self.duration_minutes(),
            self.distance,
        );

        if self.companions > 0 {
            line.push_str(&format!(" | travelled with {} other person(s)", self.companions));
        }

        line
    }
}

#[test]
fn transport_mode_parses_labels_case_insensitively() {
    assert_eq!("car".parse::<TransportMode>(), Ok(TransportMode::Car));
    assert_eq!(" Train ".parse::<TransportMode>(), Ok(TransportMode::Train));
    assert_eq!("auto-rickshaw".parse::<TransportMode>(), Ok(TransportMode::Auto));
    assert_eq!("auto".parse::<TransportMode>(), Ok(TransportMode::Auto));
    assert!("hovercraft".parse::<TransportMode>().is_err());
}

#[test]
fn transport_mode_serializes_with_display_names() {
    assert_eq!(serde_json::to_string(&TransportMode::Auto).unwrap(), "\"Auto-rickshaw\"");
    assert_eq!(serde_json::from_str::<TransportMode>("\"Motorbike\"").unwrap(), TransportMode::Motorbike);
}

#[test]
fn summary_mentions_companions_only_when_present() {
    let start_time = DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z").unwrap().with_timezone(&Utc);
    let end_time = DateTime::parse_from_rfc3339("2025-03-01T08:42:10Z").unwrap().with_timezone(&Utc);
    let mut trip = Trip {
        id: 1,
        origin: "Home".into(),
        destination: "Office".into(),
        start_time,
        end_time,
        start_coords: Coordinate::new(0., 0.),
        end_coords: Coordinate::new(0., 0.1),
        mode: TransportMode::Bus,
        companions: 0,
        distance: 11.119,
        path: vec![Coordinate::new(0., 0.), Coordinate::new(0., 0.1)],
    };

    assert_eq!(trip.duration_minutes(), 42);
    assert_eq!(trip.summary(), "2025-03-01 Bus | Home (08:00) -> Office (08:42) | 42 min, 11.12 km");

    trip.companions = 2;
    assert!(trip.summary().ends_with("travelled with 2 other person(s)"));
}

#[test]
fn duration_rounds_to_nearest_minute_in_both_directions() {
    let start_time = DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z").unwrap().with_timezone(&Utc);
    let trip_lasting = |seconds: i64| Trip {
        id: 1,
        origin: "Home".into(),
        destination: "Office".into(),
        start_time,
        end_time: start_time + chrono::Duration::seconds(seconds),
        start_coords: Coordinate::new(0., 0.),
        end_coords: Coordinate::new(0., 0.),
        mode: TransportMode::Walk,
        companions: 0,
        distance: 0.,
        path: vec![Coordinate::new(0., 0.)],
    };

    assert_eq!(trip_lasting(29).duration_minutes(), 0);
    assert_eq!(trip_lasting(30).duration_minutes(), 1);
    assert_eq!(trip_lasting(89).duration_minutes(), 1);
    assert_eq!(trip_lasting(-29).duration_minutes(), 0);
    assert_eq!(trip_lasting(-30).duration_minutes(), 0);
    assert_eq!(trip_lasting(-90).duration_minutes(), -1);
    assert_eq!(trip_lasting(-100).duration_minutes(), -2);
}
