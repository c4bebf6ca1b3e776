use std::{fs::File, io::{BufReader, BufWriter, Read, Write}, path::Path};

use gpx::{Gpx, GpxVersion, Metadata, Track, TrackSegment, Waypoint};
use trip_diary_lib::{coordinate::Coordinate, trip::Trip};

use crate::DataManagerError;

/// Reads every track point of a GPX file, in file order.
pub fn read_gpx(path: &Path) -> Result<Vec<Coordinate>, DataManagerError> {
    let file = File::open(path).map_err(|err| DataManagerError::Gpx(format!("Failed to open {:?}: {err}", path)))?;
    parse_gpx(BufReader::new(file))
}

pub fn parse_gpx(reader: impl Read) -> Result<Vec<Coordinate>, DataManagerError> {
    let gpx = gpx::read(reader).map_err(|err| DataManagerError::Gpx(format!("Failed to parse gpx: {err}")))?;

    let mut coordinates = Vec::new();
    for track in gpx.tracks {
        for segment in track.segments {
            for point in segment.points {
                coordinates.push(Coordinate::from(point.point()));
            }
        }
    }

    Ok(coordinates)
}

pub fn trip_to_gpx(trip: &Trip) -> Gpx {
    let title = format!("{} -> {}", trip.origin, trip.destination);

    let mut segment = TrackSegment::new();
    segment.points = trip.path.iter().map(|coordinate| Waypoint::new((*coordinate).into())).collect();

    let mut track = Track::new();
    track.name = Some(title.clone());
    track.segments.push(segment);

    Gpx {
        version: GpxVersion::Gpx11,
        creator: Some("trip_diary".to_string()),
        metadata: Some(Metadata {
            name: Some(title),
            ..Default::default()
        }),
        tracks: vec![track],
        ..Default::default()
    }
}

pub fn write_trip_gpx(trip: &Trip, writer: impl Write) -> Result<(), DataManagerError> {
    gpx::write(&trip_to_gpx(trip), writer).map_err(|err| DataManagerError::Gpx(format!("Failed to write gpx: {err}")))
}

pub fn export_trip_gpx(trip: &Trip, path: &Path) -> Result<(), DataManagerError> {
    let file = File::create(path).map_err(|err| DataManagerError::Gpx(format!("Failed to create {:?}: {err}", path)))?;
    write_trip_gpx(trip, BufWriter::new(file))
}

#[test]
fn exported_trip_reads_back_as_its_path() {
    use chrono::Utc;
    use trip_diary_lib::{
        active_trip::ActiveTrip,
        finalizer::{ConfirmedDestination, finalize_trip},
        trip::TransportMode,
    };

    let mut active = ActiveTrip::new(9, "Harbour".into(), Utc::now(), Coordinate::new(56.15, 10.21));
    active.append(Coordinate::new(56.151, 10.212));
    let destination = ConfirmedDestination {
        coords: Coordinate::new(56.152, 10.215),
        name: "Station".into(),
    };
    let trip = finalize_trip(&active, &destination, TransportMode::Walk, 0, Utc::now());

    let mut bytes = Vec::new();
    write_trip_gpx(&trip, &mut bytes).unwrap();

    let points = parse_gpx(bytes.as_slice()).unwrap();
    assert_eq!(points.len(), trip.path.len());
    for (read, written) in points.iter().zip(trip.path.iter()) {
        assert!((read.lat - written.lat).abs() < 1e-9);
        assert!((read.lon - written.lon).abs() < 1e-9);
    }
}
