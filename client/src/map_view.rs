use trip_diary_lib::{coordinate::Coordinate, geometry::path_distance_km};

/// What the map should show right now.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapFrame {
    pub path: Vec<Coordinate>,
    pub current_position: Option<Coordinate>,
    /// The destination candidate while the trip is being ended
    pub end_marker: Option<Coordinate>,
}

pub trait MapView: Send {
    fn render(&mut self, frame: &MapFrame);
}

/// Writes a one-line route summary to stdout whenever the frame changes.
#[derive(Default)]
pub struct TerminalMap {
    last_frame: Option<MapFrame>,
}

impl TerminalMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn describe(frame: &MapFrame) -> String {
        let mut line = format!("[map] {} points, {:.3} km", frame.path.len(), path_distance_km(&frame.path));
        if let Some(position) = frame.current_position {
            line.push_str(&format!(", at {}", position));
        }
        if let Some(marker) = frame.end_marker {
            line.push_str(&format!(", ending at {}", marker));
        }
        line
    }
}

impl MapView for TerminalMap {
    fn render(&mut self, frame: &MapFrame) {
        if self.last_frame.as_ref() == Some(frame) {
            return;
        }

        println!("{}", Self::describe(frame));
        self.last_frame = Some(frame.clone());
    }
}

#[test]
fn describe_mentions_markers() {
    let frame = MapFrame {
        path: vec![Coordinate::new(0., 0.), Coordinate::new(0., 1.)],
        current_position: Some(Coordinate::new(0., 1.)),
        end_marker: Some(Coordinate::new(0., 1.5)),
    };

    let line = TerminalMap::describe(&frame);
    assert!(line.starts_with("[map] 2 points, 111.195 km"));
    assert!(line.contains("at (0.00000, 1.00000)"));
    assert!(line.contains("ending at (0.00000, 1.50000)"));
}
