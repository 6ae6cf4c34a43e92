//! Locally implemented bus objects (spec §3 "Bus object").

pub mod bus_object;

pub use bus_object::{is_legal_object_path, parent_of, BusObject, MethodContextRow, MethodHandler};
