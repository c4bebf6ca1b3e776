pub mod configuration;
pub mod console;
pub mod controller;
pub mod dispatcher;
pub mod geocoding;
pub mod map_view;
pub mod position;
pub mod replay;
pub mod simulator;
pub mod tracker;
