pub mod coordinate;
pub mod geometry;
pub mod active_trip;
pub mod trip;
pub mod finalizer;
